pub mod locator;
pub mod markup;
pub mod poller;
pub mod probe;
