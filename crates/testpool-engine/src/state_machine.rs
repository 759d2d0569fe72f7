//! Pure resource-lifecycle transitions. No I/O, no store, no driver — the
//! executor decides *when* a transition applies, this module decides *what*
//! it is.

use testpool_domain::{Action, Status};

/// A resource is demoted to BAD after this many consecutive failed attempts
/// at its current action.
pub const MAX_ATTEMPTS: u32 = 5;

/// ATTR is the only state that polls rather than retries on error: a
/// resource with no address yet is demoted to BAD after this many polls
/// instead of rescheduling forever.
pub const MAX_ATTR_POLLS: u32 = 30;

/// The outcome of a successful action: next status, next action, and the
/// delay (in seconds) before `action_time` makes the resource due again.
pub struct Transition {
    pub status: Status,
    pub action: Action,
    pub delta_seconds: i64,
}

impl Transition {
    fn new(status: Status, action: Action, delta_seconds: i64) -> Self {
        Transition { status, action, delta_seconds }
    }
}

/// Where a resource goes after `action` completes without error.
///
/// `has_ip` only matters for `(PENDING, ATTR)`: without an address yet the
/// resource stays PENDING/ATTR and is rescheduled, rather than promoted —
/// unless `polls_before` (the number of no-address ATTR cycles already
/// spent, *before* this one) has reached `MAX_ATTR_POLLS`, in which case the
/// resource is demoted to BAD rather than polled forever.
pub fn on_success(status: Status, action: Action, has_ip: bool, clone_delay: i64, attr_delay: i64, polls_before: u32) -> Transition {
    match (status, action) {
        (Status::Pending, Action::Destroy) => Transition::new(Status::Pending, Action::Clone, clone_delay),
        (Status::Pending, Action::Clone) => Transition::new(Status::Pending, Action::Attr, attr_delay),
        (Status::Pending, Action::Attr) if has_ip => Transition::new(Status::Ready, Action::None, 0),
        (Status::Pending, Action::Attr) if polls_before + 1 >= MAX_ATTR_POLLS => {
            Transition::new(Status::Bad, Action::None, 0)
        }
        (Status::Pending, Action::Attr) => Transition::new(Status::Pending, Action::Attr, 60),
        (Status::Reserved, Action::Destroy) => Transition::new(Status::Pending, Action::Destroy, 0),
        (_, Action::None) => Transition::new(Status::Ready, Action::None, 0),
        (status, action) => Transition::new(status, action, 0),
    }
}

/// Where a resource goes after `action` fails, given its attempt count
/// *before* this failure. Below the cap it is rescheduled in place with the
/// driver's own backoff; at the cap it is demoted to BAD and its action
/// cleared, leaving it for the next pool adapt pass to clean up.
pub fn on_failure(status: Status, action: Action, attempts_before: u32, retry_delay: i64) -> Transition {
    if attempts_before + 1 >= MAX_ATTEMPTS {
        Transition::new(Status::Bad, Action::None, 0)
    } else {
        Transition::new(status, action, retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_success_schedules_clone() {
        let t = on_success(Status::Pending, Action::Destroy, false, 30, 60, 0);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.action, Action::Clone);
        assert_eq!(t.delta_seconds, 30);
    }

    #[test]
    fn clone_success_schedules_attr() {
        let t = on_success(Status::Pending, Action::Clone, false, 30, 60, 0);
        assert_eq!(t.action, Action::Attr);
        assert_eq!(t.delta_seconds, 60);
    }

    #[test]
    fn attr_success_with_ip_promotes_to_ready() {
        let t = on_success(Status::Pending, Action::Attr, true, 30, 60, 0);
        assert_eq!(t.status, Status::Ready);
        assert_eq!(t.action, Action::None);
    }

    #[test]
    fn attr_success_without_ip_reschedules_in_sixty_seconds() {
        let t = on_success(Status::Pending, Action::Attr, false, 30, 60, 0);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.action, Action::Attr);
        assert_eq!(t.delta_seconds, 60);
    }

    #[test]
    fn attr_failure_below_poll_cap_keeps_polling() {
        let t = on_success(Status::Pending, Action::Attr, false, 30, 60, MAX_ATTR_POLLS - 2);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.action, Action::Attr);
    }

    #[test]
    fn attr_failure_at_poll_cap_demotes_to_bad() {
        let t = on_success(Status::Pending, Action::Attr, false, 30, 60, MAX_ATTR_POLLS - 1);
        assert_eq!(t.status, Status::Bad);
        assert_eq!(t.action, Action::None);
    }

    #[test]
    fn reserved_destroy_returns_to_pending_destroy() {
        let t = on_success(Status::Reserved, Action::Destroy, false, 30, 60, 0);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.action, Action::Destroy);
    }

    #[test]
    fn failure_below_cap_reschedules_same_state() {
        let t = on_failure(Status::Pending, Action::Clone, 2, 45);
        assert_eq!(t.status, Status::Pending);
        assert_eq!(t.action, Action::Clone);
        assert_eq!(t.delta_seconds, 45);
    }

    #[test]
    fn failure_at_cap_demotes_to_bad() {
        let t = on_failure(Status::Pending, Action::Clone, MAX_ATTEMPTS - 1, 45);
        assert_eq!(t.status, Status::Bad);
        assert_eq!(t.action, Action::None);
    }
}
