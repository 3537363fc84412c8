//! Watch events emitted by typed stores.

use virtrigaud_api::meta::Object;

/// A change notification for one object of kind `T`.
///
/// `Applied` covers both create and update, including the update that sets
/// the deletion timestamp; `Deleted` fires when the object leaves the store.
#[derive(Debug, Clone)]
pub enum Event<T> {
    Applied(T),
    Deleted(T),
}

impl<T: Object> Event<T> {
    /// The affected object.
    pub fn object(&self) -> &T {
        match self {
            Event::Applied(obj) | Event::Deleted(obj) => obj,
        }
    }

    /// "namespace/name" key of the affected object.
    pub fn key(&self) -> String {
        self.object().meta().key()
    }
}
