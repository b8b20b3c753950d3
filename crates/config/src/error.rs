pub use archiver_common::{Error, Result};

archiver_common::impl_context!();
