//! Helpers shared by in-crate unit tests.

pub(crate) mod fake_session;
pub(crate) mod socket_guard;
