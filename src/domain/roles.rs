//! Static role catalogue: display names, privilege levels and permission sets.

use serde::Serialize;

use super::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ContentRead,
    /// Create and edit rows, including publishing through an update, soft delete,
    /// scheduling and submitting for review.
    ContentWrite,
    /// Approve, reject and unpublish.
    ContentReview,
    /// Restore tombstones and delete rows permanently.
    ContentDelete,
    MediaUpload,
    TaxonomyWrite,
    SubmissionsManage,
    UsersManage,
    AuditRead,
    DashboardView,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ContentRead => "content.read",
            Permission::ContentWrite => "content.write",
            Permission::ContentReview => "content.review",
            Permission::ContentDelete => "content.delete",
            Permission::MediaUpload => "media.upload",
            Permission::TaxonomyWrite => "taxonomy.write",
            Permission::SubmissionsManage => "submissions.manage",
            Permission::UsersManage => "users.manage",
            Permission::AuditRead => "audit.read",
            Permission::DashboardView => "dashboard.view",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoleInfo {
    pub display_name: &'static str,
    pub level: u8,
    pub permissions: &'static [Permission],
}

const VIEWER: RoleInfo = RoleInfo {
    display_name: "Viewer",
    level: 1,
    permissions: &[Permission::ContentRead],
};

const EDITOR: RoleInfo = RoleInfo {
    display_name: "Editor",
    level: 2,
    permissions: &[
        Permission::ContentRead,
        Permission::ContentWrite,
        Permission::MediaUpload,
        Permission::TaxonomyWrite,
        Permission::DashboardView,
    ],
};

const ADMIN: RoleInfo = RoleInfo {
    display_name: "Administrator",
    level: 3,
    permissions: &[
        Permission::ContentRead,
        Permission::ContentWrite,
        Permission::ContentReview,
        Permission::ContentDelete,
        Permission::MediaUpload,
        Permission::TaxonomyWrite,
        Permission::SubmissionsManage,
        Permission::UsersManage,
        Permission::AuditRead,
        Permission::DashboardView,
    ],
};

pub fn role_info(role: Role) -> &'static RoleInfo {
    match role {
        Role::Viewer => &VIEWER,
        Role::Editor => &EDITOR,
        Role::Admin => &ADMIN,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role_info(role).permissions.contains(&permission)
}

/// Roles whose catalogue entry grants `permission`.
pub fn roles_granting(permission: Permission) -> Vec<Role> {
    Role::ALL
        .iter()
        .copied()
        .filter(|role| has_permission(*role, permission))
        .collect()
}

/// Editors and admins see creator/updater ids and internal notes.
pub fn sees_admin_fields(role: Role) -> bool {
    role_info(role).level >= EDITOR.level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_strictly_ordered() {
        assert!(role_info(Role::Viewer).level < role_info(Role::Editor).level);
        assert!(role_info(Role::Editor).level < role_info(Role::Admin).level);
    }

    #[test]
    fn permissions_grow_with_level() {
        assert!(has_permission(Role::Viewer, Permission::ContentRead));
        assert!(!has_permission(Role::Viewer, Permission::ContentWrite));
        assert!(has_permission(Role::Editor, Permission::ContentWrite));
        assert!(!has_permission(Role::Editor, Permission::UsersManage));
        assert!(has_permission(Role::Admin, Permission::UsersManage));
        assert!(has_permission(Role::Admin, Permission::AuditRead));
    }

    #[test]
    fn editors_write_but_only_admins_review() {
        assert!(has_permission(Role::Editor, Permission::ContentWrite));
        assert!(!has_permission(Role::Editor, Permission::ContentReview));
        assert!(!has_permission(Role::Editor, Permission::ContentDelete));
        assert_eq!(
            roles_granting(Permission::ContentWrite),
            vec![Role::Editor, Role::Admin]
        );
        assert_eq!(roles_granting(Permission::ContentReview), vec![Role::Admin]);
        assert_eq!(
            roles_granting(Permission::ContentRead),
            vec![Role::Viewer, Role::Editor, Role::Admin]
        );
    }

    #[test]
    fn admin_fields_hidden_from_viewers() {
        assert!(!sees_admin_fields(Role::Viewer));
        assert!(sees_admin_fields(Role::Editor));
        assert!(sees_admin_fields(Role::Admin));
    }
}
