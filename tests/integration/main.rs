//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulation adapters.  All tests run on the host (x86_64)
//! with no real hardware required; time only moves when a test advances
//! the virtual clock.

mod debounce_tests;
mod derived_tests;
mod mock_hw;
mod pool_tests;
mod sampling_tests;
