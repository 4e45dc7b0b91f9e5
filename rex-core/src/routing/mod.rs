//! Routing: template compilation, the keyed route table and the
//! registration surface.

pub mod path;
pub mod router;
pub mod table;

pub use path::{compile, CompiledPath};
pub use router::{PrefixRoute, RouteEntry, Router, Routing};
pub use table::{Registered, RouteMatch, RouteRecord, RouteTable};

/// Path of `path` mounted under `prefix`
pub(crate) fn mount_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{}/{}", prefix, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_path() {
        assert_eq!(mount_path("/api", "/users"), "/api/users");
        assert_eq!(mount_path("/api/", "users"), "/api/users");
        assert_eq!(mount_path("/api", "/"), "/api");
        assert_eq!(mount_path("/", "/x"), "/x");
        assert_eq!(mount_path("", "/"), "/");
    }
}
