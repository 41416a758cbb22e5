use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::action::BoundActions;
use crate::selector::Selector;
use crate::store::{Props, StoreHandle, StoreState, StoreValue, Subscription};

type OnChange<O> = Box<dyn Fn(&Arc<O>) + Send + Sync>;

struct Shared<S, A, Sel: Selector<S, A>> {
    selector: Sel,
    args: RwLock<A>,
    current: RwLock<Arc<Sel::Output>>,
    state: StoreState<S>,
    on_change: OnChange<Sel::Output>,
}

impl<S, A, Sel> Shared<S, A, Sel>
where
    S: StoreValue,
    A: Send + Sync + 'static,
    Sel: Selector<S, A> + 'static,
{
    /// Select against the store's current state, or without it for
    /// selectors that never read state.
    fn select_now(&self) -> Arc<Sel::Output> {
        let args = self.args.read();
        match self.selector.without_state(&args) {
            Some(selected) => selected,
            None => self.selector.select(&self.state.get_state(), &args),
        }
    }

    fn refresh(&self, next: Arc<Sel::Output>) -> bool {
        {
            let mut current = self.current.write();
            if Arc::ptr_eq(&*current, &next) {
                return false;
            }
            *current = Arc::clone(&next);
        }
        (self.on_change)(&next);
        true
    }
}

/// Selected view of one store for one consumer.
///
/// Dropping the subscriber unsubscribes it.
pub struct StoreSubscriber<S, P, Sel, A = ()>
where
    Sel: Selector<S, A>,
{
    shared: Arc<Shared<S, A, Sel>>,
    actions: BoundActions<S, P>,
    subscription: Option<Subscription>,
}

impl<S, P, Sel, A> StoreSubscriber<S, P, Sel, A>
where
    S: StoreValue,
    P: Props,
    A: Send + Sync + 'static,
    Sel: Selector<S, A> + 'static,
{
    /// Select the initial slice and, unless the selector ignores state,
    /// subscribe to the store.
    pub fn new<F>(handle: StoreHandle<S, P>, selector: Sel, args: A, on_change: F) -> Self
    where
        F: Fn(&Arc<Sel::Output>) + Send + Sync + 'static,
    {
        let StoreHandle { state, actions } = handle;
        let initial = match selector.without_state(&args) {
            Some(selected) => selected,
            None => selector.select(&state.get_state(), &args),
        };
        let reads_state = selector.reads_state();
        let shared = Arc::new(Shared {
            selector,
            args: RwLock::new(args),
            current: RwLock::new(initial),
            state,
            on_change: Box::new(on_change),
        });
        let subscription = reads_state.then(|| {
            let weak: Weak<Shared<S, A, Sel>> = Arc::downgrade(&shared);
            shared.state.subscribe(move |state| {
                if let Some(shared) = weak.upgrade() {
                    let next = shared.selector.select(state, &shared.args.read());
                    shared.refresh(next);
                }
            })
        });
        Self {
            shared,
            actions,
            subscription,
        }
    }

    /// The slice as of the last notification.
    pub fn current(&self) -> Arc<Sel::Output> {
        Arc::clone(&*self.shared.current.read())
    }

    /// Re-select against the store's state right now. Use this at the
    /// moment of rendering rather than a value cached at subscription time.
    pub fn snapshot(&self) -> Arc<Sel::Output> {
        self.shared.select_now()
    }

    /// Replace the selector args and re-select immediately. Returns whether
    /// the slice changed, in which case the change callback has run.
    pub fn set_args(&self, args: A) -> bool {
        *self.shared.args.write() = args;
        self.shared.refresh(self.shared.select_now())
    }

    pub fn actions(&self) -> &BoundActions<S, P> {
        &self.actions
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}
