//! Helpers shared by the end-to-end segment tests in `tests/`.

pub mod test_util;
