mod codec;
mod errors;
mod messages;
mod room_code;

pub use codec::{
    Frame, MAX_FRAME_BODY_BYTES, RECEIVE_BUFFER_BYTES, new_receive_buffer, read_frame,
    write_frame, write_json_message, write_line_json, write_raw_frame,
};
pub use errors::CodecError;
pub use messages::{
    AuthRequest, AuthResponse, FrameHeader, MESSAGE_TYPE_PING, Notification,
    NOTIFICATION_CLIENT_CONNECTED, NOTIFICATION_CLIENT_DISCONNECTED,
    NOTIFICATION_CONTROLLER_DISCONNECTED, NOTIFICATION_CONTROLLER_RECONNECTED, Pong, Role,
};
pub use room_code::{ROOM_CODE_LEN, generate_room_code, is_valid_room_code, normalize_room_code};
