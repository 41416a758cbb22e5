//! Reference binding between a store and a consumer.
//!
//! A rendering layer keeps one [`StoreSubscriber`] per mounted consumer. It
//! holds the selected slice, recomputes it on every store notification and
//! calls back only when the selector produced a different `Arc`.

mod subscriber;

pub use subscriber::StoreSubscriber;
