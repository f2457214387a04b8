#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RoleOp {
    Add,
    Remove,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum RolesError {
    #[error("role {0:?} already exists")]
    AlreadyExists(String),

    #[error("role {0:?} not found")]
    NotFound(String),
}

/// `change_roles()` returns a new role list with `role` added or removed. Removing the last role
/// yields an empty list.
pub fn change_roles(roles: &[String], op: RoleOp, role: &str) -> Result<Vec<String>, RolesError> {
    let present = roles.iter().any(|r| r == role);
    match op {
        RoleOp::Add => {
            if present {
                return Err(RolesError::AlreadyExists(role.to_string()));
            }
            let mut changed = roles.to_vec();
            changed.push(role.to_string());
            Ok(changed)
        }
        RoleOp::Remove => {
            if !present {
                return Err(RolesError::NotFound(role.to_string()));
            }
            Ok(roles.iter().filter(|r| *r != role).cloned().collect())
        }
    }
}
