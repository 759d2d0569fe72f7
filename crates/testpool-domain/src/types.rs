use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolName(pub String);

impl PoolName {
    pub fn new(s: impl Into<String>) -> Self {
        PoolName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(pub Uuid);

impl HostId {
    pub fn new() -> Self {
        HostId(Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    pub fn new() -> Self {
        ResourceId(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Resource lifecycle ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ready,
    Reserved,
    Bad,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Ready => write!(f, "ready"),
            Status::Reserved => write!(f, "reserved"),
            Status::Bad => write!(f, "bad"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    None,
    Destroy,
    Clone,
    Attr,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::Destroy => write!(f, "destroy"),
            Action::Clone => write!(f, "clone"),
            Action::Attr => write!(f, "attr"),
        }
    }
}

// ── Core structs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    /// Opaque string understood by exactly one driver (e.g. a docker socket
    /// path or a libvirt connection URI).
    pub connection: String,
    /// Driver key; must resolve in the driver registry to be serviceable.
    pub product: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: PoolName,
    pub host: HostId,
    pub template_name: String,
    /// 0 means "drain and delete".
    pub resource_max: u32,
}

impl Pool {
    /// True iff this pool has no declared capacity left and nothing to drain.
    pub fn deleteable(&self, resource_count: usize) -> bool {
        self.resource_max == 0 && resource_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub pool: PoolName,
    /// Stable across the resource's lifetime; a destroy+clone cycle reuses it.
    pub name: String,
    pub status: Status,
    pub action: Action,
    pub action_time: DateTime<Utc>,
    pub ip_addr: Option<String>,
    /// Consecutive driver-call failures on the current action; capped by
    /// `MAX_ATTEMPTS`. Independent of `poll_count` below — a successful call
    /// always resets this to 0 regardless of what it returned.
    pub attempts: u32,
    /// Consecutive no-address ATTR polls; capped by `MAX_ATTR_POLLS`. Only
    /// meaningful while `(status, action) == (PENDING, ATTR)`.
    pub poll_count: u32,
}

impl Resource {
    /// A freshly created resource: `(PENDING, CLONE, now)`.
    pub fn new_pending_clone(pool: PoolName, name: impl Into<String>) -> Self {
        Resource {
            id: ResourceId::new(),
            pool,
            name: name.into(),
            status: Status::Pending,
            action: Action::Clone,
            action_time: Utc::now(),
            ip_addr: None,
            attempts: 0,
            poll_count: 0,
        }
    }

    /// A BAD placeholder row created by setup before the backend is enumerated.
    pub fn new_bad_placeholder(pool: PoolName, name: impl Into<String>) -> Self {
        Resource {
            id: ResourceId::new(),
            pool,
            name: name.into(),
            status: Status::Bad,
            action: Action::None,
            action_time: Utc::now(),
            ip_addr: None,
            attempts: 0,
            poll_count: 0,
        }
    }

    /// `status == READY ⟹ action == NONE`, `status == RESERVED ⟹ action == DESTROY`.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            Status::Ready => self.action == Action::None,
            Status::Reserved => self.action == Action::Destroy,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resource_is_pending_clone() {
        let r = Resource::new_pending_clone(PoolName::new("p"), "p.0");
        assert_eq!(r.status, Status::Pending);
        assert_eq!(r.action, Action::Clone);
        assert!(r.invariant_holds());
    }

    #[test]
    fn ready_without_none_action_violates_invariant() {
        let mut r = Resource::new_pending_clone(PoolName::new("p"), "p.0");
        r.status = Status::Ready;
        r.action = Action::Attr;
        assert!(!r.invariant_holds());
    }

    #[test]
    fn reserved_requires_destroy_action() {
        let mut r = Resource::new_pending_clone(PoolName::new("p"), "p.0");
        r.status = Status::Reserved;
        r.action = Action::Destroy;
        assert!(r.invariant_holds());
        r.action = Action::Clone;
        assert!(!r.invariant_holds());
    }

    #[test]
    fn pool_deleteable_requires_zero_max_and_no_resources() {
        let pool = Pool {
            name: PoolName::new("p"),
            host: HostId::new(),
            template_name: "tmpl".into(),
            resource_max: 0,
        };
        assert!(pool.deleteable(0));
        assert!(!pool.deleteable(1));

        let pool2 = Pool { resource_max: 1, ..pool };
        assert!(!pool2.deleteable(0));
    }

    #[test]
    fn status_display_matches_lowercase_serde_names() {
        assert_eq!(Status::Pending.to_string(), "pending");
        assert_eq!(Action::Clone.to_string(), "clone");
    }
}
