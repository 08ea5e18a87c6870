//! Compiles a C summation loop at runtime and races it against the same loop
//! in Rust.
//!
//! ```bash
//! RUST_LOG=tinycc=debug cargo run --example jit -- 10000000
//! ```

use std::ffi::c_longlong;
use std::time::Instant;
use tinycc::prelude::*;
use tracing_subscriber::EnvFilter;

const SOURCE: &str = r#"
long long sum_to(long long n)
{
    long long total = 0;
    for (long long i = 0; i < n; i++)
        total += i;
    return total;
}
"#;

type SumFn = extern "C" fn(c_longlong) -> c_longlong;

fn sum_to(n: c_longlong) -> c_longlong {
    let mut total: c_longlong = 0;
    for i in 0..n {
        total = total.wrapping_add(i);
    }
    total
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let n: c_longlong = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 10_000_000,
    };

    let started = Instant::now();
    let mut state = TccState::new()?;
    state.set_diagnostic_handler(|diagnostic| eprintln!("tcc: {diagnostic}"));
    state.compile_string(SOURCE)?;
    state.relocate()?;
    let compiled = unsafe { state.get_function::<SumFn>("sum_to")? }
        .ok_or("sum_to was not found in the compiled image")?;
    println!("compile + relocate: {:?}", started.elapsed());

    let started = Instant::now();
    let from_c = compiled(n);
    println!("tcc:  {from_c} in {:?}", started.elapsed());

    let started = Instant::now();
    let from_rust = sum_to(std::hint::black_box(n));
    println!("rust: {from_rust} in {:?}", started.elapsed());

    assert_eq!(from_c, from_rust);
    Ok(())
}
