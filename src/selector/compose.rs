use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Selector;

/// A tuple of input selectors evaluated against the same `(state, args)`.
pub trait SelectorInputs<S, A>: Send + Sync {
    type Outputs: Send + Sync + 'static;

    fn select_all(&self, state: &Arc<S>, args: &A) -> Self::Outputs;

    /// Whether two sets of input outputs are equal position by position.
    fn same(previous: &Self::Outputs, next: &Self::Outputs) -> bool;

    fn reads_state(&self) -> bool;
}

/// The result function of a composed selector, taking one reference per input.
pub trait Combine<Outputs, O>: Send + Sync {
    fn combine(&self, outputs: &Outputs) -> O;
}

macro_rules! impl_inputs {
    ($($input:ident $index:tt),+) => {
        impl<S, A, $($input),+> SelectorInputs<S, A> for ($($input,)+)
        where
            $($input: Selector<S, A>,)+
        {
            type Outputs = ($(Arc<<$input as Selector<S, A>>::Output>,)+);

            fn select_all(&self, state: &Arc<S>, args: &A) -> Self::Outputs {
                ($(self.$index.select(state, args),)+)
            }

            fn same(previous: &Self::Outputs, next: &Self::Outputs) -> bool {
                $((Arc::ptr_eq(&previous.$index, &next.$index) || previous.$index == next.$index))&&+
            }

            fn reads_state(&self) -> bool {
                $(self.$index.reads_state())||+
            }
        }

        impl<F, O, $($input),+> Combine<($(Arc<$input>,)+), O> for F
        where
            F: Fn($(&$input),+) -> O + Send + Sync,
        {
            fn combine(&self, outputs: &($(Arc<$input>,)+)) -> O {
                self($(&*outputs.$index),+)
            }
        }
    };
}

impl_inputs!(I0 0);
impl_inputs!(I0 0, I1 1);
impl_inputs!(I0 0, I1 1, I2 2);
impl_inputs!(I0 0, I1 1, I2 2, I3 3);

/// Selector built from input selectors and a result function.
///
/// The result function only runs when some input produced a value that is
/// not equal to its previous one. Composed selectors are selectors too, so
/// they nest.
pub struct ComposedSelector<S, A, I, C, O>
where
    I: SelectorInputs<S, A>,
{
    inputs: I,
    combine: C,
    memo: Mutex<Option<(I::Outputs, Arc<O>)>>,
    recomputations: AtomicUsize,
    _marker: PhantomData<fn(&S, &A)>,
}

/// Compose `inputs` (a tuple of up to four selectors) with `combine`.
///
/// ```
/// use std::sync::Arc;
/// use canopy::selector::{create_memoized_selector, create_selector, Selector};
///
/// let len = create_memoized_selector(|s: &Vec<u32>, _: &()| s.len());
/// let sum = create_memoized_selector(|s: &Vec<u32>, _: &()| s.iter().sum::<u32>());
/// let mean = create_selector((len, sum), |len: &usize, sum: &u32| {
///     if *len == 0 { 0 } else { *sum / *len as u32 }
/// });
/// assert_eq!(*mean.select(&Arc::new(vec![2, 4, 6]), &()), 4);
/// ```
pub fn create_selector<S, A, I, C, O>(inputs: I, combine: C) -> ComposedSelector<S, A, I, C, O>
where
    I: SelectorInputs<S, A>,
    C: Combine<I::Outputs, O>,
{
    ComposedSelector {
        inputs,
        combine,
        memo: Mutex::new(None),
        recomputations: AtomicUsize::new(0),
        _marker: PhantomData,
    }
}

impl<S, A, I, C, O> ComposedSelector<S, A, I, C, O>
where
    I: SelectorInputs<S, A>,
{
    /// How many times the result function has run.
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }
}

impl<S, A, I, C, O> Selector<S, A> for ComposedSelector<S, A, I, C, O>
where
    I: SelectorInputs<S, A>,
    C: Combine<I::Outputs, O>,
    O: PartialEq + Send + Sync + 'static,
{
    type Output = O;

    fn select(&self, state: &Arc<S>, args: &A) -> Arc<O> {
        let inputs = self.inputs.select_all(state, args);
        if let Some((previous, output)) = &*self.memo.lock() {
            if I::same(previous, &inputs) {
                return Arc::clone(output);
            }
        }

        let next = self.combine.combine(&inputs);
        self.recomputations.fetch_add(1, Ordering::Relaxed);

        let mut memo = self.memo.lock();
        let output = match &*memo {
            Some((_, previous)) if **previous == next => Arc::clone(previous),
            _ => Arc::new(next),
        };
        *memo = Some((inputs, Arc::clone(&output)));
        output
    }

    fn reads_state(&self) -> bool {
        self.inputs.reads_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::create_memoized_selector;

    #[derive(Debug, PartialEq)]
    struct Cart {
        prices: Vec<u32>,
        discount: u32,
        note: String,
    }

    fn cart(prices: &[u32], discount: u32, note: &str) -> Arc<Cart> {
        Arc::new(Cart {
            prices: prices.to_vec(),
            discount,
            note: note.to_string(),
        })
    }

    #[test]
    fn result_function_runs_only_on_input_change() {
        let subtotal = create_memoized_selector(|c: &Cart, _: &()| c.prices.iter().sum::<u32>());
        let discount = create_memoized_selector(|c: &Cart, _: &()| c.discount);
        let total = create_selector((subtotal, discount), |sub: &u32, off: &u32| {
            sub.saturating_sub(*off)
        });

        let first = total.select(&cart(&[10, 20], 5, "a"), &());
        assert_eq!(*first, 25);
        let second = total.select(&cart(&[10, 20], 5, "b"), &());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(total.recomputations(), 1);

        let third = total.select(&cart(&[10, 20, 5], 5, "b"), &());
        assert_eq!(*third, 30);
        assert_eq!(total.recomputations(), 2);
    }

    #[test]
    fn equal_result_keeps_previous_reference() {
        let subtotal = create_memoized_selector(|c: &Cart, _: &()| c.prices.iter().sum::<u32>());
        let over = create_selector((subtotal,), |sub: &u32| *sub > 100);

        let first = over.select(&cart(&[10], 0, ""), &());
        let second = over.select(&cart(&[20], 0, ""), &());
        assert_eq!(over.recomputations(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn composed_selectors_nest() {
        let count = create_memoized_selector(|c: &Cart, _: &()| c.prices.len());
        let subtotal = create_memoized_selector(|c: &Cart, _: &()| c.prices.iter().sum::<u32>());
        let average = create_selector((count, subtotal), |n: &usize, sum: &u32| {
            if *n == 0 {
                0
            } else {
                *sum / *n as u32
            }
        });
        let label = create_selector((average,), |avg: &u32| format!("avg {avg}"));
        assert_eq!(*label.select(&cart(&[3, 5], 0, ""), &()), "avg 4");
        assert!(label.reads_state());
    }

    #[test]
    fn args_reach_every_input() {
        let above = create_memoized_selector(|c: &Cart, min: &u32| {
            c.prices.iter().filter(|p| **p >= *min).count()
        });
        let below = create_memoized_selector(|c: &Cart, min: &u32| {
            c.prices.iter().filter(|p| **p < *min).count()
        });
        let split = create_selector((above, below), |a: &usize, b: &usize| (*a, *b));
        let state = cart(&[1, 5, 10], 0, "");
        assert_eq!(*split.select(&state, &5), (2, 1));
        assert_eq!(*split.select(&state, &11), (0, 3));
    }
}
