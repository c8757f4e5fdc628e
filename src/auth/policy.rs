//! Authorization policy: admins may do anything, readers may only read.

use crate::auth::models::Role;
use axum::http::Method;

/// Methods that never mutate state.
pub fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

pub fn permits(role: Role, method: &Method) -> bool {
    role.can_write() || is_read(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_permitted_everything() {
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            assert!(permits(Role::Admin, &method));
        }
    }

    #[test]
    fn test_reader_limited_to_reads() {
        assert!(permits(Role::Reader, &Method::GET));
        assert!(permits(Role::Reader, &Method::HEAD));
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            assert!(!permits(Role::Reader, &method), "{method} should be forbidden");
        }
    }
}
