use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Selector;

struct Memo<S, A, O> {
    state: Arc<S>,
    args: A,
    output: Arc<O>,
}

/// Selector function with a single-entry memo.
///
/// The function is skipped when the state is the same `Arc` and the args
/// compare equal to the previous call. When it does run and produces a value
/// equal to the previous output, the previous `Arc` is returned.
pub struct MemoSelector<S, A, O, F> {
    f: F,
    memo: Mutex<Option<Memo<S, A, O>>>,
    recomputations: AtomicUsize,
}

/// Wrap `f` in a [`MemoSelector`].
///
/// ```
/// use std::sync::Arc;
/// use canopy::selector::{create_memoized_selector, Selector};
///
/// let total = create_memoized_selector(|items: &Vec<u32>, _: &()| items.iter().sum::<u32>());
/// let state = Arc::new(vec![1, 2, 3]);
/// let first = total.select(&state, &());
/// let second = total.select(&state, &());
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(total.recomputations(), 1);
/// ```
pub fn create_memoized_selector<S, A, O, F>(f: F) -> MemoSelector<S, A, O, F>
where
    F: Fn(&S, &A) -> O,
{
    MemoSelector {
        f,
        memo: Mutex::new(None),
        recomputations: AtomicUsize::new(0),
    }
}

impl<S, A, O, F> MemoSelector<S, A, O, F> {
    /// How many times the wrapped function has run.
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Forget the memoized entry.
    pub fn clear(&self) {
        *self.memo.lock() = None;
    }
}

impl<S, A, O, F> Selector<S, A> for MemoSelector<S, A, O, F>
where
    S: Send + Sync + 'static,
    A: Clone + PartialEq + Send + Sync + 'static,
    O: PartialEq + Send + Sync + 'static,
    F: Fn(&S, &A) -> O + Send + Sync,
{
    type Output = O;

    fn select(&self, state: &Arc<S>, args: &A) -> Arc<O> {
        if let Some(memo) = &*self.memo.lock() {
            if Arc::ptr_eq(&memo.state, state) && memo.args == *args {
                return Arc::clone(&memo.output);
            }
        }

        let next = (self.f)(state, args);
        self.recomputations.fetch_add(1, Ordering::Relaxed);

        let mut memo = self.memo.lock();
        let output = match &*memo {
            Some(previous) if *previous.output == next => Arc::clone(&previous.output),
            _ => Arc::new(next),
        };
        *memo = Some(Memo {
            state: Arc::clone(state),
            args: args.clone(),
            output: Arc::clone(&output),
        });
        output
    }
}

impl<S, A, O, F> std::fmt::Debug for MemoSelector<S, A, O, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoSelector")
            .field("recomputations", &self.recomputations())
            .finish_non_exhaustive()
    }
}
