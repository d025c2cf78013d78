//! Protocol and configuration constants for keysh.

// =============================================================================
// Server Defaults
// =============================================================================

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2222";

/// Command run when the client does not supply one.
pub const DEFAULT_COMMAND: &str = "bash";

/// Terminal type used when a pty request carries an empty name.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// SSH identification string sent to clients.
pub const SERVER_ID: &str = "SSH-2.0-keysh";

/// Maximum authentication attempts per connection.
pub const MAX_AUTH_ATTEMPTS: usize = 6;

// =============================================================================
// Terminal Constants
// =============================================================================

/// Initial terminal columns when the client sends zero.
pub const DEFAULT_TERMINAL_COLS: u16 = 80;

/// Initial terminal rows when the client sends zero.
pub const DEFAULT_TERMINAL_ROWS: u16 = 24;

// =============================================================================
// Buffer Sizes
// =============================================================================

/// Read buffer size for pty and client forwarding loops.
pub const FORWARD_BUFFER_SIZE: usize = 8192;

/// In-memory pipe capacity between the transport and a session.
pub const CLIENT_PIPE_CAPACITY: usize = 64 * 1024;

/// Channel data messages queued toward a session before the transport waits.
pub const CLIENT_INPUT_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit status reported to the client when launch or batch execution fails.
pub const FAILURE_EXIT_STATUS: u32 = 1;

/// Offset added to a signal number when a child is killed by a signal.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;
