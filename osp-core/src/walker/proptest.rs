//! Property-based tests for walker traversal using proptest.
//!
//! On acyclic graphs a depth-first and a breadth-first walker that follow
//! every outgoing edge must reach the same set of nodes, dispatch the same
//! number of times, and differ at most in order.
