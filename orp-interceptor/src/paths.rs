use std::path::{Path, PathBuf};

use orp_core::config::orp_root;

pub const BUS_SOCKET: &str = "bus.sock";
pub const INSTALLED_MARKER: &str = "installed";

pub fn run_dir(home: &Path) -> PathBuf {
    orp_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(BUS_SOCKET)
}

pub fn state_dir(home: &Path) -> PathBuf {
    orp_root(home).join("state")
}

pub fn installed_marker_path(home: &Path) -> PathBuf {
    state_dir(home).join(INSTALLED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lives_under_dot_orp() {
        let home = Path::new("/home/user");
        assert_eq!(socket_path(home), PathBuf::from("/home/user/.orp/run/bus.sock"));
        assert_eq!(
            installed_marker_path(home),
            PathBuf::from("/home/user/.orp/state/installed")
        );
    }
}
