//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `config_store` | ConfigPort         | postcard blob (NVS analogue)|
//! | `log_sink`     | NotificationSink   | Serial log output           |
//! | `time`         | Clock              | Monotonic system timer      |
//!
//! Pin-level adapters (interlock outputs, LED, watchdog) live in
//! [`crate::drivers`]; the sensor UART source lives in [`crate::sensors`].

pub mod config_store;
pub mod log_sink;
pub mod time;
