// External I/O operations module
pub mod context; // Foreground context port
pub mod lock; // Single-instance lock file
pub mod signals; // Unix signal handling
