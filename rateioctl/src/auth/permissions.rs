use crate::{
    api::models::users::{CurrentUser, Role},
    errors::Error,
    types::{Operation, Resource, UserId},
    AppState,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

pub mod resource {
    use crate::types::Resource;

    // Resource types
    #[derive(Default)]
    pub struct Users;

    #[derive(Default)]
    pub struct Credits;

    #[derive(Default)]
    pub struct Withdrawals;

    #[derive(Default)]
    pub struct Notifications;

    #[derive(Default)]
    pub struct Stats;

    // Convert type-level markers to enum values using Into
    impl From<Users> for Resource {
        fn from(_: Users) -> Resource {
            Resource::Users
        }
    }
    impl From<Credits> for Resource {
        fn from(_: Credits) -> Resource {
            Resource::Credits
        }
    }
    impl From<Withdrawals> for Resource {
        fn from(_: Withdrawals) -> Resource {
            Resource::Withdrawals
        }
    }
    impl From<Notifications> for Resource {
        fn from(_: Notifications) -> Resource {
            Resource::Notifications
        }
    }
    impl From<Stats> for Resource {
        fn from(_: Stats) -> Resource {
            Resource::Stats
        }
    }
}

pub mod operation {
    use crate::types::Operation;

    // Operation types
    #[derive(Default)]
    pub struct CreateAll;

    #[derive(Default)]
    pub struct CreateOwn;

    #[derive(Default)]
    pub struct ReadAll;

    #[derive(Default)]
    pub struct ReadOwn;

    #[derive(Default)]
    pub struct UpdateAll;

    #[derive(Default)]
    pub struct UpdateOwn;

    #[derive(Default)]
    pub struct DeleteAll;

    #[derive(Default)]
    pub struct DeleteOwn;

    impl From<CreateAll> for Operation {
        fn from(_: CreateAll) -> Operation {
            Operation::CreateAll
        }
    }
    impl From<CreateOwn> for Operation {
        fn from(_: CreateOwn) -> Operation {
            Operation::CreateOwn
        }
    }
    impl From<ReadAll> for Operation {
        fn from(_: ReadAll) -> Operation {
            Operation::ReadAll
        }
    }
    impl From<ReadOwn> for Operation {
        fn from(_: ReadOwn) -> Operation {
            Operation::ReadOwn
        }
    }
    impl From<UpdateAll> for Operation {
        fn from(_: UpdateAll) -> Operation {
            Operation::UpdateAll
        }
    }
    impl From<UpdateOwn> for Operation {
        fn from(_: UpdateOwn) -> Operation {
            Operation::UpdateOwn
        }
    }
    impl From<DeleteAll> for Operation {
        fn from(_: DeleteAll) -> Operation {
            Operation::DeleteAll
        }
    }
    impl From<DeleteOwn> for Operation {
        fn from(_: DeleteOwn) -> Operation {
            Operation::DeleteOwn
        }
    }
}

pub struct RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    pub current_user: CurrentUser,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current_user = CurrentUser::from_request_parts(parts, state).await?;

        // Convert the types to enum values using Default + Into
        let resource = R::default().into();
        let operation = O::default().into();

        // Check if user has the required permission
        if has_permission(&current_user, resource, operation) {
            Ok(RequiresPermission {
                current_user,
                _marker: PhantomData,
            })
        } else {
            Err(Error::InsufficientPermissions {
                required: crate::types::Permission::Allow(resource, operation),
                action: operation,
                resource: format!("{resource:?}"),
            })
        }
    }
}

// Implement Deref so RequiresPermission<R, O> behaves like CurrentUser
impl<R, O> std::ops::Deref for RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.current_user
    }
}

/// Check if a user has permission to perform an operation on a resource
pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    // Admin users have access to everything
    if user.is_admin {
        return true;
    }

    // Otherwise check if any of the user's roles grants the permission
    user.roles.iter().any(|role| role_has_permission(role, resource, operation))
}

/// Check if a role grants permission for a resource/operation
pub fn role_has_permission(role: &Role, resource: Resource, operation: Operation) -> bool {
    match role {
        // The three marketplace roles share the same self-service surface;
        // they differ in how credits reach them, not in what they may call.
        // All-scoped operations and platform stats stay admin-only.
        Role::Customer | Role::Professional | Role::Influencer => {
            matches!(
                (resource, operation),
                (Resource::Users, Operation::ReadOwn)
                    | (Resource::Users, Operation::UpdateOwn)
                    | (Resource::Credits, Operation::ReadOwn)
                    | (Resource::Withdrawals, Operation::CreateOwn)
                    | (Resource::Withdrawals, Operation::ReadOwn)
                    | (Resource::Notifications, Operation::ReadOwn)
                    | (Resource::Notifications, Operation::UpdateOwn)
            )
        }
    }
}

/// Generic helper to check if user can perform an operation on their own resources
/// (combines ID matching and Own permission check)
fn can_perform_own_operation(user: &CurrentUser, resource: Resource, operation: Operation, target_user_id: UserId) -> bool {
    // Must be the same user AND have the Own permission for the resource
    user.id == target_user_id && has_permission(user, resource, operation)
}

/// Generic helper to check if user can perform an operation on all resources (admin-level access)
fn can_perform_all_operation(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    has_permission(user, resource, operation)
}

// Macro to generate convenience functions for each operation type
macro_rules! generate_permission_helpers {
    ($operation_name:ident, $all_operation:expr, $own_operation:expr) => {
        paste::paste! {
            /// Check if user can [<$operation_name:lower>] their own resources (combines ID matching and [<$operation_name>]Own permission)
            pub fn [<can_ $operation_name:lower _own_resource>](user: &CurrentUser, resource: Resource, target_user_id: UserId) -> bool {
                can_perform_own_operation(user, resource, $own_operation, target_user_id)
            }

            /// Check if user can [<$operation_name:lower>] all resources of a type (admin-level access)
            pub fn [<can_ $operation_name:lower _all_resources>](user: &CurrentUser, resource: Resource) -> bool {
                can_perform_all_operation(user, resource, $all_operation)
            }
        }
    };
}

// Generate all the convenience functions
// i.e can_read_own_resource, can_read_all_resources, etc.
generate_permission_helpers!(read, Operation::ReadAll, Operation::ReadOwn);
generate_permission_helpers!(create, Operation::CreateAll, Operation::CreateOwn);
generate_permission_helpers!(update, Operation::UpdateAll, Operation::UpdateOwn);
generate_permission_helpers!(delete, Operation::DeleteAll, Operation::DeleteOwn);
