//! Logging shims shared by every module.
//!
//! Bare-metal builds forward to `defmt`; host builds print to stdout with a
//! level prefix. Call sites must stick to positional `{}` placeholders and
//! primitive arguments so both backends accept the same format strings.

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::info!($($arg)*);
        #[cfg(not(target_os = "none"))]
        std::println!("[pano] INFO {}", format_args!($($arg)*));
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::warn!($($arg)*);
        #[cfg(not(target_os = "none"))]
        std::println!("[pano] WARN {}", format_args!($($arg)*));
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::debug!($($arg)*);
        #[cfg(all(not(target_os = "none"), feature = "verbose"))]
        std::println!("[pano] DEBUG {}", format_args!($($arg)*));
        #[cfg(all(not(target_os = "none"), not(feature = "verbose")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}
