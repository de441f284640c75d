use axum::Router;

/// API sub-prefixes that external handler groups attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiGroup {
    Auth,
    Products,
    Categories,
    Cart,
    Orders,
    Users,
    Reviews,
    Admin,
}

impl ApiGroup {
    pub const ALL: [ApiGroup; 8] = [
        ApiGroup::Auth,
        ApiGroup::Products,
        ApiGroup::Categories,
        ApiGroup::Cart,
        ApiGroup::Orders,
        ApiGroup::Users,
        ApiGroup::Reviews,
        ApiGroup::Admin,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            ApiGroup::Auth => "/api/auth",
            ApiGroup::Products => "/api/products",
            ApiGroup::Categories => "/api/categories",
            ApiGroup::Cart => "/api/cart",
            ApiGroup::Orders => "/api/orders",
            ApiGroup::Users => "/api/users",
            ApiGroup::Reviews => "/api/reviews",
            ApiGroup::Admin => "/api/admin",
        }
    }
}

/// Handler groups to mount under their API prefixes. Groups that are never
/// mounted answer with the uniform 404.
#[derive(Default)]
pub struct ApiRoutes {
    groups: Vec<(ApiGroup, Router)>,
}

impl ApiRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `router` under `group`'s prefix. Mounting the same group twice
    /// merges the routers.
    pub fn mount(mut self, group: ApiGroup, router: Router) -> Self {
        match self.groups.iter_mut().find(|(existing, _)| *existing == group) {
            Some((_, mounted)) => {
                let previous = std::mem::take(mounted);
                *mounted = previous.merge(router);
            }
            None => self.groups.push((group, router)),
        }
        self
    }

    pub fn is_mounted(&self, group: ApiGroup) -> bool {
        self.groups.iter().any(|(existing, _)| *existing == group)
    }

    pub(crate) fn into_groups(self) -> Vec<(ApiGroup, Router)> {
        self.groups
    }
}
