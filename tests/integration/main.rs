//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the
//! peripheral against the recording host-stack simulation.  All tests run
//! on the host with no radio required.

mod access_tests;
mod gap_flow_tests;
mod mock_stack;
mod notification_tests;
