use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::id::OwnerId;

lazy_static! {
    /// Process-wide session, shared by every controller of the process.
    pub static ref SESSION: SessionContext = SessionContext::new();
}

/// The only thing the controller needs to know about authentication.
pub trait Identity: Send + Sync {
    fn current_owner_id(&self) -> Option<OwnerId>;
}

type Listener = Arc<dyn Fn(Option<&OwnerId>) + Send + Sync>;

/// Handle returned by [`SessionContext::on_change`].
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub struct Subscription(u64);

#[derive(Default)]
struct State {
    active: bool,
    owner: Option<OwnerId>,
    next_subscription: u64,
    listeners: Vec<(Subscription, Listener)>,
}

/// Session state with an explicit lifecycle: `init()` when the
/// application mounts, `teardown()` when it goes away.
/// Listeners are notified on every owner change while active.
#[derive(Default)]
pub struct SessionContext {
    state: RwLock<State>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self) {
        let mut state = self.write();
        if state.active {
            return;
        }
        log::debug!("session initialized");
        state.active = true;
    }

    /// Drops every listener and forgets the owner.
    pub fn teardown(&self) {
        let mut state = self.write();
        state.active = false;
        state.owner = None;
        state.listeners.clear();
        log::debug!("session torn down");
    }

    pub fn is_active(&self) -> bool {
        self.read().active
    }

    pub fn sign_in(&self, owner: OwnerId) {
        self.set_owner(Some(owner));
    }

    pub fn sign_out(&self) {
        self.set_owner(None);
    }

    pub fn current_owner_id(&self) -> Option<OwnerId> {
        self.read().owner.clone()
    }

    pub fn on_change(
        &self,
        callback: impl Fn(Option<&OwnerId>) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = self.write();
        let subscription = Subscription(state.next_subscription);
        state.next_subscription += 1;
        state.listeners.push((subscription, Arc::new(callback)));
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.write()
            .listeners
            .retain(|(s, _)| *s != subscription);
    }

    fn set_owner(&self, owner: Option<OwnerId>) {
        let listeners: Vec<Listener> = {
            let mut state = self.write();
            if !state.active {
                log::warn!("session change ignored, context is not initialized");
                return;
            }
            if state.owner == owner {
                return;
            }
            state.owner = owner.clone();
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        // Listeners run without the lock held so they may query the session.
        for listener in listeners {
            listener(owner.as_ref());
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        crate::read(&self.state)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        crate::write(&self.state)
    }
}

impl Identity for SessionContext {
    fn current_owner_id(&self) -> Option<OwnerId> {
        SessionContext::current_owner_id(self)
    }
}

/// [`Identity`] backed by the process-wide [`SESSION`].
#[derive(Default, Clone, Copy, Debug)]
pub struct GlobalSession;

impl Identity for GlobalSession {
    fn current_owner_id(&self) -> Option<OwnerId> {
        SESSION.current_owner_id()
    }
}
