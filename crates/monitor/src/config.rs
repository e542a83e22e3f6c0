use std::time::Duration;

/// Default console polling period.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);
/// Two ETX bytes closer together than this end a raw session.
pub const DEFAULT_BREAK_WINDOW: Duration = Duration::from_secs(1);
/// Default serial device.
pub const DEFAULT_PORT_PATH: &str = "/dev/tty.usbserial-FT4ZS6I31";
/// Default baud rate for the mailbox protocol.
pub const DEFAULT_LINK_BAUD: u32 = 1_000_000;
/// Default baud rate for the raw byte-pipe terminal.
pub const DEFAULT_RAW_BAUD: u32 = 812_500;

/// Terminal loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Console polling period.
    pub tick: Duration,
    /// Double-ETX window for the raw terminal.
    pub break_window: Duration,
    /// Echo forwarded keystrokes locally.
    pub local_echo: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            break_window: DEFAULT_BREAK_WINDOW,
            local_echo: false,
        }
    }
}
