pub mod test_manual_reconnect_rebuilds;
