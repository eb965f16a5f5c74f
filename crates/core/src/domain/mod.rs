pub mod bottleneck;
pub mod business;
pub mod dialog;
pub mod multi_agent;
pub mod refined;
pub mod suggestion;
