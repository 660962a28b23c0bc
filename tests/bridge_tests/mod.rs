//! Bridge integration tests
//!
//! # Test Organization
//!
//! - `session_flow`: Stories about a user typing into a terminal, resizing it,
//!   sending garbage, and having parameters rejected up front
//!
//! - `teardown`: Stories about who leaves first. The shell exiting on its own,
//!   the client disconnecting while the shell is still running, and a shell
//!   that refuses to exit

mod session_flow;
mod teardown;
