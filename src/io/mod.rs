// IO backends for the datagram transport.
// Numan Thabit 2026

pub mod udp;
