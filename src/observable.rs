//! Current-value-plus-subscribe state holder.
//!
//! Subscribers see the latest value immediately and every later change;
//! there is no history beyond the current value.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publish `value`; subscribers are only woken when it differs.
    pub fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_current_then_changes() {
        let state = Observable::new(1u32);
        state.set(2);

        let mut rx = state.subscribe();
        assert_eq!(*rx.borrow_and_update(), 2);

        state.set(3);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 3);
    }

    #[test]
    fn test_equal_value_does_not_notify() {
        let state = Observable::new("idle".to_string());
        let mut rx = state.subscribe();
        rx.borrow_and_update();

        state.set("idle".to_string());
        assert!(!rx.has_changed().unwrap());
        state.set("syncing".to_string());
        assert!(rx.has_changed().unwrap());
        assert_eq!(state.get(), "syncing");
    }
}
