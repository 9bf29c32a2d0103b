//! External delivery channels for saved-search notifications.

pub mod email;
