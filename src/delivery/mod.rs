pub mod adapter;
pub mod fanout;
pub mod http;
pub mod signature;
pub mod types;

pub use adapter::Deliverer;
pub use fanout::deliver_all;
