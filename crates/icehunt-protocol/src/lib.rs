//! Instrumentation ABI shared between the icehunt engine and the compiler
//! under test.
//!
//! The compiler is built against an AFL-style instrumentation library: at
//! startup it reads a System V shared-memory identifier from an environment
//! variable, attaches the segment, and bumps one byte per executed edge
//! (index = `hash(prev_edge, cur_edge) % MAP_SIZE`). The engine only ever
//! reads the segment; the child only ever writes it.
//!
//! This crate carries nothing but the constants both sides must agree on,
//! so it has zero dependencies.

/// Size of the coverage bitmap in bytes (64 KB, the AFL default).
///
/// Must match the `MAP_SIZE` the instrumentation library was built with.
pub const MAP_SIZE: usize = 65536;

/// Environment variable through which the engine advertises the shared
/// memory identifier to the instrumented child. The name is fixed by the
/// upstream instrumentation library.
pub const SHM_ENV_VAR: &str = "__AFL_SHM_ID";
