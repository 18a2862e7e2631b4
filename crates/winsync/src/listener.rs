//! Listener registry
//!
//! One subscriber list per event category. Lists are shared through `Rc`
//! so a callback may subscribe or unsubscribe (itself or others) while its
//! own category is being dispatched: dispatch always walks a snapshot taken
//! before the first callback runs.
//!
//! A callback that panics is isolated. The panic is caught, reported as a
//! [`ListenerFault`] and the remaining subscribers still run.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::bus::Envelope;
use crate::state::CurrentState;
use crate::window::WindowRecord;

/// Event categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    State,
    Message,
    NewWindow,
    RemovedWindow,
    UpdatedWindow,
    ActiveWindow,
    Meta,
    /// Diagnostics: listener faults in any other category
    Error,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::State => "state",
            Category::Message => "message",
            Category::NewWindow => "new-window",
            Category::RemovedWindow => "removed-window",
            Category::UpdatedWindow => "updated-window",
            Category::ActiveWindow => "active-window",
            Category::Meta => "meta",
            Category::Error => "error",
        };
        f.write_str(name)
    }
}

/// A subscriber callback that panicked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerFault {
    pub category: Category,
    pub message: String,
}

type Callback<A> = Rc<dyn Fn(&A)>;

struct Slots<A: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Callback<A>)>,
}

/// Type-erased removal, so a `Subscription` does not carry the argument type
trait Detach {
    fn detach(&self, id: u64) -> bool;
    fn holds(&self, id: u64) -> bool;
}

impl<A: 'static> Detach for RefCell<Slots<A>> {
    fn detach(&self, id: u64) -> bool {
        let mut slots = self.borrow_mut();
        let before = slots.entries.len();
        slots.entries.retain(|(entry, _)| *entry != id);
        slots.entries.len() != before
    }

    fn holds(&self, id: u64) -> bool {
        self.borrow().entries.iter().any(|(entry, _)| *entry == id)
    }
}

/// Handle returned by every `add_*_listener` call
///
/// Dropping the handle does *not* unsubscribe; call [`Subscription::unsubscribe`]
/// or the matching `remove_*_listener`.
#[derive(Clone)]
pub struct Subscription {
    category: Category,
    id: u64,
    list: Weak<dyn Detach>,
}

impl Subscription {
    pub fn category(&self) -> Category {
        self.category
    }

    /// Remove the listener
    ///
    /// Returns `true` the first time; later calls, and calls after the
    /// owning manager is gone, return `false`.
    pub fn unsubscribe(&self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.detach(self.id))
            .unwrap_or(false)
    }

    /// Whether the listener is still registered
    pub fn is_active(&self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.holds(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("category", &self.category)
            .field("id", &self.id)
            .finish()
    }
}

/// Subscriber list for one category
pub struct ListenerList<A: 'static> {
    category: Category,
    slots: Rc<RefCell<Slots<A>>>,
}

impl<A: 'static> Clone for ListenerList<A> {
    fn clone(&self) -> Self {
        Self {
            category: self.category,
            slots: self.slots.clone(),
        }
    }
}

impl<A: 'static> ListenerList<A> {
    pub(crate) fn new(category: Category) -> Self {
        Self {
            category,
            slots: Rc::new(RefCell::new(Slots {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Register a callback
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push((id, Rc::new(callback)));
            id
        };
        let erased: Rc<dyn Detach> = self.slots.clone();
        Subscription {
            category: self.category,
            id,
            list: Rc::downgrade(&erased),
        }
    }

    /// Remove a callback registered on this list
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        subscription.category == self.category && self.slots.detach(subscription.id)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every subscriber registered when dispatch started
    pub(crate) fn emit(&self, arg: &A) -> Vec<ListenerFault> {
        let snapshot: Vec<Callback<A>> = self
            .slots
            .borrow()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        let mut faults = Vec::new();
        for callback in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(arg))) {
                faults.push(ListenerFault {
                    category: self.category,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        faults
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// All subscriber lists of one manager
///
/// Cloning yields another handle to the *same* lists, which is how a
/// callback can register or remove listeners from inside a dispatch.
pub struct Listeners<M: 'static, P: 'static> {
    pub(crate) state: ListenerList<CurrentState<M>>,
    pub(crate) message: ListenerList<Envelope<P>>,
    pub(crate) new_window: ListenerList<WindowRecord>,
    pub(crate) removed_window: ListenerList<WindowRecord>,
    pub(crate) updated_window: ListenerList<WindowRecord>,
    pub(crate) active_window: ListenerList<Option<WindowRecord>>,
    pub(crate) meta: ListenerList<M>,
    pub(crate) error: ListenerList<ListenerFault>,
}

impl<M: 'static, P: 'static> Clone for Listeners<M, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            message: self.message.clone(),
            new_window: self.new_window.clone(),
            removed_window: self.removed_window.clone(),
            updated_window: self.updated_window.clone(),
            active_window: self.active_window.clone(),
            meta: self.meta.clone(),
            error: self.error.clone(),
        }
    }
}

impl<M: 'static, P: 'static> Default for Listeners<M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static, P: 'static> Listeners<M, P> {
    pub fn new() -> Self {
        Self {
            state: ListenerList::new(Category::State),
            message: ListenerList::new(Category::Message),
            new_window: ListenerList::new(Category::NewWindow),
            removed_window: ListenerList::new(Category::RemovedWindow),
            updated_window: ListenerList::new(Category::UpdatedWindow),
            active_window: ListenerList::new(Category::ActiveWindow),
            meta: ListenerList::new(Category::Meta),
            error: ListenerList::new(Category::Error),
        }
    }

    /// Remove a listener of any category
    pub fn remove(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn add_state_listener(&self, f: impl Fn(&CurrentState<M>) + 'static) -> Subscription {
        self.state.subscribe(f)
    }

    /// Message listeners receive `(message, from_id)`
    pub fn add_message_listener(&self, f: impl Fn(&P, &str) + 'static) -> Subscription {
        self.message
            .subscribe(move |envelope: &Envelope<P>| f(&envelope.message, &envelope.from))
    }

    pub fn add_new_window_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.new_window.subscribe(f)
    }

    pub fn add_remove_window_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.removed_window.subscribe(f)
    }

    pub fn add_window_update_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.updated_window.subscribe(f)
    }

    /// Active-window listeners receive `None` when no window is active
    pub fn add_active_window_listener(
        &self,
        f: impl Fn(Option<&WindowRecord>) + 'static,
    ) -> Subscription {
        self.active_window
            .subscribe(move |window: &Option<WindowRecord>| f(window.as_ref()))
    }

    pub fn add_meta_listener(&self, f: impl Fn(&M) + 'static) -> Subscription {
        self.meta.subscribe(f)
    }

    pub fn add_error_listener(&self, f: impl Fn(&ListenerFault) + 'static) -> Subscription {
        self.error.subscribe(f)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    pub fn remove_state_listener(&self, subscription: &Subscription) -> bool {
        self.state.unsubscribe(subscription)
    }

    pub fn remove_message_listener(&self, subscription: &Subscription) -> bool {
        self.message.unsubscribe(subscription)
    }

    pub fn remove_new_window_listener(&self, subscription: &Subscription) -> bool {
        self.new_window.unsubscribe(subscription)
    }

    pub fn remove_remove_window_listener(&self, subscription: &Subscription) -> bool {
        self.removed_window.unsubscribe(subscription)
    }

    pub fn remove_window_update_listener(&self, subscription: &Subscription) -> bool {
        self.updated_window.unsubscribe(subscription)
    }

    pub fn remove_active_window_listener(&self, subscription: &Subscription) -> bool {
        self.active_window.unsubscribe(subscription)
    }

    pub fn remove_meta_listener(&self, subscription: &Subscription) -> bool {
        self.meta.unsubscribe(subscription)
    }

    pub fn remove_error_listener(&self, subscription: &Subscription) -> bool {
        self.error.unsubscribe(subscription)
    }
}
