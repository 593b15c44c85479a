//! Per-task-kind builders (`spec.md` §4.5–§4.16).

pub mod call_function_builder;
pub mod call_grpc_builder;
pub mod call_http_builder;
pub mod do_builder;
pub mod for_builder;
pub mod fork_builder;
pub mod listen_builder;
pub mod raise_builder;
pub mod run_builder;
pub mod set_builder;
pub mod switch_builder;
pub mod try_builder;
pub mod wait_builder;

#[cfg(test)]
pub mod tests_support;
