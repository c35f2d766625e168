//! Integration-test harness crate for SecureNetDisk: wires together
//! `sdis-server` and `sdis-client` against a loopback TCP listener so
//! `tests/` can exercise the full protocol stack end to end.
