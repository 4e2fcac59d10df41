pub mod dashboard;
pub mod dispatch;
pub mod ingest;
pub mod reveal;
pub mod session;
pub mod store;
pub mod stream;
pub mod timer;
pub mod trace;
pub mod traits;
pub mod view;
