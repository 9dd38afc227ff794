use std::path::{Path, PathBuf};

use thiserror::Error;

const UNIT_NAME: &str = "envelo-agent.service";

#[derive(Debug, Error)]
pub enum AutostartError {
    #[error("no user configuration directory available for autostart")]
    NoConfigDir,
    #[error("autostart registration failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Host-level restart-on-boot registration.
///
/// `deregister` runs on every shutdown so a deliberate stop is not undone at
/// the next boot. Both calls must be idempotent.
pub trait Autostart: Send + Sync {
    fn register(&self) -> Result<(), AutostartError>;
    fn deregister(&self) -> Result<(), AutostartError>;
}

/// Hosts without autostart support, or where it is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAutostart;

impl Autostart for NoAutostart {
    fn register(&self) -> Result<(), AutostartError> {
        Ok(())
    }

    fn deregister(&self) -> Result<(), AutostartError> {
        Ok(())
    }
}

/// systemd user unit, enabled through the `default.target.wants` link that
/// `systemctl --user enable` would create.
#[derive(Debug, Clone)]
pub struct SystemdUserUnit {
    unit_dir: PathBuf,
    exec_start: String,
    description: String,
}

impl SystemdUserUnit {
    pub fn new(unit_dir: PathBuf, exec_start: impl Into<String>, certificate_id: &str) -> Self {
        Self {
            unit_dir,
            exec_start: exec_start.into(),
            description: format!("ENVELO interlock agent ({certificate_id})"),
        }
    }

    /// Unit for the running executable under `~/.config/systemd/user`.
    ///
    /// Connection settings are not written into the unit; they come from
    /// the environment / `.env` the service starts with.
    pub fn for_current_exe(certificate_id: &str) -> Result<Self, AutostartError> {
        let unit_dir = dirs::config_dir()
            .ok_or(AutostartError::NoConfigDir)?
            .join("systemd")
            .join("user");
        let exe = std::env::current_exe().map_err(|source| AutostartError::Io {
            path: PathBuf::from("<current_exe>"),
            source,
        })?;
        Ok(Self::new(unit_dir, exe.display().to_string(), certificate_id))
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(UNIT_NAME)
    }

    fn wants_link(&self) -> PathBuf {
        self.unit_dir.join("default.target.wants").join(UNIT_NAME)
    }

    fn render(&self) -> String {
        format!(
            "[Unit]\n\
             Description={}\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             ExecStart={}\n\
             Restart=always\n\
             RestartSec=5\n\
             \n\
             [Install]\n\
             WantedBy=default.target\n",
            self.description, self.exec_start
        )
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AutostartError + '_ {
    move |source| AutostartError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_if_present(path: &Path) -> Result<(), AutostartError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path)(e)),
    }
}

impl Autostart for SystemdUserUnit {
    fn register(&self) -> Result<(), AutostartError> {
        let unit_path = self.unit_path();
        std::fs::create_dir_all(&self.unit_dir).map_err(io_err(&self.unit_dir))?;
        std::fs::write(&unit_path, self.render()).map_err(io_err(&unit_path))?;

        let link = self.wants_link();
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        remove_if_present(&link)?;
        link_unit(&unit_path, &link)
    }

    fn deregister(&self) -> Result<(), AutostartError> {
        remove_if_present(&self.wants_link())?;
        remove_if_present(&self.unit_path())
    }
}

#[cfg(unix)]
fn link_unit(unit_path: &Path, link: &Path) -> Result<(), AutostartError> {
    std::os::unix::fs::symlink(unit_path, link).map_err(io_err(link))
}

#[cfg(not(unix))]
fn link_unit(unit_path: &Path, link: &Path) -> Result<(), AutostartError> {
    std::fs::copy(unit_path, link)
        .map(|_| ())
        .map_err(io_err(link))
}
