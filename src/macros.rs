/// Increment a diagnostics counter by 1.
#[macro_export]
macro_rules! stat_inc {
    ($counter:ident) => {
        $crate::stats::STATS
            .$counter
            .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed);
    };
}

/// Add a value to a diagnostics counter.
#[macro_export]
macro_rules! stat_add {
    ($counter:ident, $val:expr) => {
        $crate::stats::STATS
            .$counter
            .fetch_add($val as u32, ::core::sync::atomic::Ordering::Relaxed);
    };
}

/// Subtract a value from a diagnostics counter.
#[macro_export]
macro_rules! stat_sub {
    ($counter:ident, $val:expr) => {
        $crate::stats::STATS
            .$counter
            .fetch_sub($val as u32, ::core::sync::atomic::Ordering::Relaxed);
    };
}

/// Check a structural invariant, halting via [`crate::fatal`] on breach.
///
/// Compiles to nothing unless the `debug` feature is enabled.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $msg:expr) => {
        if cfg!(feature = "debug") && !$cond {
            $crate::fatal($msg);
        }
    };
}
