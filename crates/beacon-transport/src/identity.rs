/// Process-wide and per-instance sender identity.
///
/// The process id and hostname are computed once per process and shared
/// read-only by every transport in it; each transport adds its own
/// instance id.
use std::sync::OnceLock;

static PROCESS: OnceLock<ProcessIdentity> = OnceLock::new();

/// Identity shared by every instance in this process.
#[derive(Debug)]
pub struct ProcessIdentity {
    pid: String,
    host_name: String,
}

impl ProcessIdentity {
    /// The lazily initialized identity of the current process.
    pub fn get() -> &'static ProcessIdentity {
        PROCESS.get_or_init(|| ProcessIdentity {
            pid: uuid::Uuid::new_v4().simple().to_string(),
            host_name: gethostname::gethostname().to_string_lossy().into_owned(),
        })
    }

    /// Random id, unique across hosts, stable for the life of the process.
    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }
}

/// Generate a fresh instance id.
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Sender fields stamped on every outgoing envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub pid: String,
    pub iid: String,
    pub host_name: String,
}

impl Origin {
    /// Origin for an instance of this process.
    ///
    /// `host_name` overrides the process hostname when set.
    pub fn local(iid: String, host_name: Option<String>) -> Self {
        let process = ProcessIdentity::get();
        Self {
            pid: process.pid().to_string(),
            iid,
            host_name: host_name.unwrap_or_else(|| process.host_name().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_identity_is_shared() {
        let a = ProcessIdentity::get();
        let b = ProcessIdentity::get();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.pid().len(), 32);
    }

    #[test]
    fn instances_share_pid_not_iid() {
        let a = Origin::local(new_instance_id(), None);
        let b = Origin::local(new_instance_id(), Some("custom".into()));
        assert_eq!(a.pid, b.pid);
        assert_ne!(a.iid, b.iid);
        assert_eq!(b.host_name, "custom");
        assert_eq!(a.host_name, ProcessIdentity::get().host_name());
    }
}
