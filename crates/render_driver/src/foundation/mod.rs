//! Foundation utilities shared by the driver and its hosts

pub mod logging;
