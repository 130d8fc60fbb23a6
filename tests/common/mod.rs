//! Shared fixtures for the loopback tests
// (c) 2026 rupd contributors
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rupd::{client::DebugSink, role::Role, server::Server, Configuration};
use tempfile::TempDir;

/// Prints the version line from the first line of the archive, then unpacks to `<base>/`.
///
/// An archive containing a `with-driver` line also carries its own update driver.
/// `@ROOT@` is replaced by the robot's root directory; the stub leaves `decrypt_ran` there.
pub const DECRYPT_STUB: &str = r#"#!/bin/sh
touch "@ROOT@/decrypt_ran"
[ "$1" = "decrypt" ] || exit 2
[ "$3" = "sekrit" ] || { echo "bad key" >&2; exit 1; }
base="${2%.enc.tar.gz}"
printf 'software_version '
head -n 1 "$2"
mkdir -p "$base/src"
echo "unpacked" > "$base/src/README"
if grep -q '^with-driver$' "$2"; then
    mkdir -p "$base/scripts"
    printf '#!/bin/sh\necho bundled driver "$@"\n' > "$base/scripts/mr_update.sh"
    chmod 755 "$base/scripts/mr_update.sh"
fi
"#;

/// Exits cleanly without unpacking anything
pub const DECRYPT_NOTHING: &str = r#"#!/bin/sh
touch "@ROOT@/decrypt_ran"
echo "software_version MR1.0.0"
echo "corrupt archive" >&2
"#;

/// Unpacks the archive but prints no version line
pub const DECRYPT_UNMARKED: &str = r#"#!/bin/sh
mkdir -p "${2%.enc.tar.gz}/src"
"#;

pub const DRIVER_OK: &str = r#"#!/bin/sh
echo "driver $1 $2 $3"
sleep 0.3
echo "[build] Summary: 3 packages finished"
"#;

pub const DRIVER_FAILING: &str = r#"#!/bin/sh
echo "driver $1 $2 $3"
echo "[build] Failed: 2 packages failed." >&2
"#;

/// A scratch area laid out the way a robot is
pub struct Robot {
    pub root: TempDir,
}

impl Robot {
    pub fn new(driver: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        for d in ["scripts", "install", "staging", "logs", "client"] {
            std::fs::create_dir_all(root.path().join(d)).unwrap();
        }
        let robot = Self { root };
        robot.script("script.sh", DECRYPT_STUB);
        robot.script("mr_update.sh", driver);
        robot.script("fs_update.sh", driver);
        robot
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.root.path().join(sub)
    }

    /// Installs a helper script, replacing any previous one of that name
    pub fn script(&self, name: &str, body: &str) {
        let path = self.path("scripts").join(name);
        let body = body.replace("@ROOT@", &self.root.path().to_string_lossy());
        std::fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    /// Server configuration for one role, listening on an ephemeral loopback port
    pub fn config(&self, role: Role) -> Configuration {
        let mut config = Configuration::system_default().clone();
        config.bind_address = "127.0.0.1".into();
        let (mr, fs) = match role {
            Role::Mr => (0, 1),
            Role::Fs => (1, 0),
        };
        config.mr_port = mr;
        config.fs_port = fs;
        config.install_root = self.path("install");
        config.staging_root = self.path("staging");
        config.script_dir = self.path("scripts");
        config.log_root = self.path("logs");
        config.decrypt_key = "sekrit".into();
        config.progress_interval_ms = 100;
        config.connect_timeout_ms = 2000;
        config
    }

    /// Has the decrypt script been run?
    pub fn decrypt_ran(&self) -> bool {
        self.path("decrypt_ran").exists()
    }

    /// Starts a server in the background
    pub async fn serve(&self, role: Role) -> SocketAddr {
        self.serve_with(role, self.config(role)).await
    }

    /// Starts a server in the background with a customised configuration
    pub async fn serve_with(&self, role: Role, config: Configuration) -> SocketAddr {
        let server = Server::bind(role, config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let _ = tokio::spawn(server.run());
        addr
    }

    /// Writes an archive whose first line is the version it claims
    pub fn archive(&self, name: &str, version: &str, size: usize) -> PathBuf {
        self.write_archive(name, format!("{version}\n"), size)
    }

    /// As [`archive`](Self::archive), but the workspace ships its own update driver
    pub fn archive_with_driver(&self, name: &str, version: &str, size: usize) -> PathBuf {
        self.write_archive(name, format!("{version}\nwith-driver\n"), size)
    }

    fn write_archive(&self, name: &str, header: String, size: usize) -> PathBuf {
        let mut data = header.into_bytes();
        data.resize(size.max(data.len()), b'x');
        let path = self.path("client").join(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}

/// A sink that remembers everything it is told
pub fn capture() -> (Arc<dyn DebugSink>, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&lines);
    let sink = move |text: &str| store.lock().unwrap().push(text.to_string());
    (Arc::new(sink), lines)
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut v: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    v.sort();
    v
}
