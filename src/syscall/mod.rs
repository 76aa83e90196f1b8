//! System Call Interface
//!
//! A process traps with `ecall`, the call number in `t0` and arguments in
//! `a0..a7`. The dispatcher decodes and bounds-checks the arguments, runs
//! the call and writes `t0` (and `a0` for calls returning a value).
//!
//! # Calls
//! | nr    | call                                                       |
//! |-------|------------------------------------------------------------|
//! | 0-4   | get_info, reg_read, reg_write, sync, sleep                 |
//! | 5-11  | cap_read, cap_move, cap_delete, cap_revoke, cap_derive, pmp_load, pmp_unload |
//! | 12-21 | mon_suspend, mon_resume, mon_state_get, mon_yield, mon_reg_read, mon_reg_write, mon_cap_read, mon_cap_move, mon_pmp_load, mon_pmp_unload |
//! | 22-24 | sock_send, sock_recv, sock_sendrecv                        |
//!
//! Calls 0-4 only touch the caller and run without the kernel lock.

mod handler;
mod validate;

pub use validate::{numbers, Info, Syscall};
