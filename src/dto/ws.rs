//! WebSocket wire protocol: the text-frame envelope, the tagged message
//! enums for both peer classes, and the binary jingle frame layout.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::QuestionKind;

/// Payload bytes carried per jingle chunk.
pub const JINGLE_CHUNK_SIZE: usize = 4096;
/// Binary header: `[uint32 jingleId][uint32 chunkIndex]`, little-endian.
pub const JINGLE_HEADER_LEN: usize = 8;

/// Originator tag carried in every text envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PeerRole {
    #[serde(rename = "SERVER")]
    Server,
    #[serde(rename = "ANGULAR")]
    Angular,
    #[serde(rename = "BUZZER")]
    Buzzer,
}

/// Text frame envelope `{type, timestamp, sender, payload}`.
///
/// The message enum is flattened in, contributing the `type` tag and the
/// `payload` object.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub message: T,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PeerRole>,
}

impl Envelope<ServerMessage> {
    /// Wrap an outbound message with the server tag and the given instant.
    pub fn server(message: ServerMessage, timestamp: u64) -> Self {
        Self {
            message,
            timestamp,
            sender: Some(PeerRole::Server),
        }
    }
}

impl Envelope<ClientMessage> {
    /// Parse an inbound text frame.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Client clock readings attached to answers and buzzes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClientTimestamps {
    /// Device-local clock reading, ms since epoch.
    #[serde(default)]
    pub local: Option<u64>,
    /// Reading mapped onto server time via the sync echo.
    #[serde(default)]
    pub synced: Option<u64>,
    /// Half round-trip measured by the device, ms.
    #[serde(default, rename = "calibratedLatency")]
    pub calibrated_latency: Option<i64>,
}

/// Server parameters shared with the console on connect.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServerConfigInfo {
    #[serde(rename = "maxBuzzers")]
    pub max_buzzers: usize,
    pub version: String,
}

/// Snapshot of one registered buzzer as reported to the console.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuzzerInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "connectedAt")]
    pub connected_at: u64,
    #[serde(default)]
    pub battery: Option<u8>,
    #[serde(default, rename = "wifiRSSI")]
    pub wifi_rssi: Option<i32>,
    #[serde(default)]
    pub latency: Option<u32>,
    pub connected: bool,
}

/// Messages accepted from identified and unidentified peers.
///
/// Unknown types land in [`ClientMessage::Unknown`] and are logged and
/// dropped by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    // -- console --
    #[serde(rename = "ANGULAR_CONNECT")]
    AngularConnect,
    #[serde(rename = "REQUEST_BUZZER_LIST")]
    RequestBuzzerList,
    #[serde(rename = "PLAYER_RENAME")]
    PlayerRename {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "newName")]
        new_name: String,
    },
    #[serde(rename = "QUESTION_SEND")]
    QuestionSend {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
    },
    #[serde(rename = "GAME_START")]
    GameStart {
        #[serde(rename = "gameId")]
        game_id: String,
        name: String,
        #[serde(rename = "totalQuestions")]
        total_questions: u32,
    },
    #[serde(rename = "BUZZER_DISCONNECT")]
    BuzzerDisconnect {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
    },
    #[serde(rename = "BUZZ_CORRECT")]
    BuzzCorrect {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
    },
    #[serde(rename = "BUZZ_REOPEN")]
    BuzzReopen {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
    },
    #[serde(rename = "JINGLE_PLAY")]
    JinglePlay {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "jingleId")]
        jingle_id: u32,
    },

    // -- buzzer --
    #[serde(rename = "BUZZER_REGISTER")]
    BuzzerRegister {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(default, rename = "macAddress")]
        mac_address: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "ANSWER_MCQ")]
    AnswerMcq {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        answer: String,
        #[serde(default)]
        timestamps: ClientTimestamps,
    },
    #[serde(rename = "ANSWER_BUZZER")]
    AnswerBuzzer {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(default)]
        timestamps: ClientTimestamps,
    },
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate {
        #[serde(default)]
        battery: Option<u8>,
        #[serde(default, rename = "wifiRSSI")]
        wifi_rssi: Option<i32>,
        #[serde(default, rename = "freeHeap")]
        free_heap: Option<u32>,
    },

    // -- either class --
    #[serde(rename = "TIME_SYNC_REQ")]
    TimeSyncReq {
        #[serde(rename = "T1")]
        t1: u64,
    },
    #[serde(rename = "PING")]
    Ping {
        #[serde(rename = "T_send")]
        t_send: u64,
    },
    #[serde(rename = "PONG")]
    Pong {
        #[serde(default, rename = "T_send")]
        t_send: Option<u64>,
        #[serde(default, rename = "T_receive")]
        t_receive: Option<u64>,
    },

    #[serde(other)]
    Unknown,
}

/// Messages originated by the server toward either peer class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    // -- console --
    #[serde(rename = "CONNECTED")]
    Connected {
        #[serde(rename = "sessionID")]
        session_id: String,
        #[serde(rename = "serverTime")]
        server_time: u64,
        config: ServerConfigInfo,
    },
    #[serde(rename = "BUZZER_LIST_UPDATE")]
    BuzzerListUpdate {
        buzzers: Vec<BuzzerInfo>,
        total: usize,
    },
    #[serde(rename = "BUZZER_CONNECTED")]
    BuzzerConnected {
        buzzer: BuzzerInfo,
        #[serde(rename = "totalBuzzers")]
        total_buzzers: usize,
    },
    #[serde(rename = "BUZZER_DISCONNECTED")]
    BuzzerDisconnected {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "totalBuzzers")]
        total_buzzers: usize,
    },
    #[serde(rename = "QUESTION_SENT")]
    QuestionSent {
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "sentTo")]
        sent_to: usize,
        timestamp: u64,
    },
    #[serde(rename = "BUZZ_WINNER")]
    BuzzWinner {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "playerName")]
        player_name: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "responseTime")]
        response_time: u64,
    },
    #[serde(rename = "BUZZ_VALIDATED")]
    BuzzValidated {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        points: u32,
        #[serde(rename = "responseTime")]
        response_time: u64,
    },
    #[serde(rename = "BUZZ_REOPENED")]
    BuzzReopened {
        #[serde(rename = "excludedPlayers")]
        excluded_players: Vec<String>,
        #[serde(rename = "remainingPlayers")]
        remaining_players: Vec<String>,
    },
    #[serde(rename = "JINGLE_STARTED")]
    JingleStarted {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "jingleId")]
        jingle_id: u32,
        name: String,
        #[serde(rename = "fileSize")]
        file_size: u64,
    },
    #[serde(rename = "JINGLE_COMPLETED")]
    JingleCompleted {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "jingleId")]
        jingle_id: u32,
        #[serde(rename = "totalChunks")]
        total_chunks: u32,
    },
    #[serde(rename = "JINGLE_ERROR")]
    JingleError {
        #[serde(default, rename = "buzzerID")]
        buzzer_id: Option<String>,
        #[serde(default, rename = "jingleId")]
        jingle_id: Option<u32>,
        error: String,
    },
    #[serde(rename = "ANSWER_RECEIVED")]
    AnswerReceived {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        answer: String,
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        points: u32,
        #[serde(rename = "responseTime")]
        response_time: u64,
        timestamps: ClientTimestamps,
    },
    #[serde(rename = "BUZZER_STATUS_UPDATE")]
    BuzzerStatusUpdate {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(default)]
        battery: Option<u8>,
        #[serde(default, rename = "wifiRSSI")]
        wifi_rssi: Option<i32>,
        #[serde(default, rename = "freeHeap")]
        free_heap: Option<u32>,
    },
    #[serde(rename = "ERROR")]
    Error { message: String },

    // -- buzzer --
    #[serde(rename = "CONNECTION_ACK")]
    ConnectionAck {
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        #[serde(rename = "playerNumber")]
        player_number: u32,
        #[serde(rename = "serverTime")]
        server_time: u64,
    },
    #[serde(rename = "CONNECTION_REJECTED")]
    ConnectionRejected { reason: String },
    #[serde(rename = "PLAYER_NAME_UPDATE")]
    PlayerNameUpdate { name: String },
    #[serde(rename = "QUESTION_START")]
    QuestionStart {
        #[serde(rename = "gameId")]
        game_id: String,
        id: u32,
        text: String,
        #[serde(rename = "type")]
        kind: QuestionKind,
        #[serde(default)]
        category: Option<String>,
        points: u32,
        #[serde(rename = "startTime")]
        start_time: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answers: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correct_answer: Option<String>,
    },
    #[serde(rename = "GAME_STARTED")]
    GameStarted {
        #[serde(rename = "gameId")]
        game_id: String,
        name: String,
        #[serde(rename = "totalQuestions")]
        total_questions: u32,
    },
    #[serde(rename = "ANSWER_RESULT")]
    AnswerResult {
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        points: u32,
        #[serde(rename = "responseTime")]
        response_time: u64,
    },
    #[serde(rename = "BUZZ_IGNORED")]
    BuzzIgnored { reason: String },
    #[serde(rename = "BUZZER_LOCKED")]
    BuzzerLocked {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(rename = "winnerID")]
        winner_id: String,
    },
    #[serde(rename = "BUZZER_UNLOCKED")]
    BuzzerUnlocked {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
    },
    #[serde(rename = "BUZZER_EXCLUDED")]
    BuzzerExcluded {
        #[serde(rename = "gameId")]
        game_id: String,
        #[serde(rename = "questionId")]
        question_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "JINGLE_START")]
    JingleStart {
        #[serde(rename = "jingleId")]
        jingle_id: u32,
        name: String,
        format: String,
        #[serde(rename = "fileSize")]
        file_size: u64,
    },
    #[serde(rename = "JINGLE_END")]
    JingleEnd {
        #[serde(rename = "jingleId")]
        jingle_id: u32,
        #[serde(rename = "totalChunks")]
        total_chunks: u32,
        #[serde(rename = "fileSize")]
        file_size: u64,
    },

    // -- either class --
    #[serde(rename = "TIME_SYNC_RES")]
    TimeSyncRes {
        #[serde(rename = "T1")]
        t1: u64,
        #[serde(rename = "T2")]
        t2: u64,
        #[serde(rename = "T3")]
        t3: u64,
    },
    #[serde(rename = "PING")]
    Ping {
        #[serde(rename = "T_send")]
        t_send: u64,
    },
    #[serde(rename = "PONG")]
    Pong {
        #[serde(rename = "T_send")]
        t_send: u64,
        #[serde(rename = "T_receive")]
        t_receive: u64,
    },
}

/// Assemble one binary jingle frame: 8-byte LE header plus payload.
pub fn encode_jingle_frame(jingle_id: u32, chunk_index: u32, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(JINGLE_HEADER_LEN + payload.len());
    frame.put_u32_le(jingle_id);
    frame.put_u32_le(chunk_index);
    frame.put_slice(payload);
    frame.freeze()
}

/// Split a binary jingle frame back into `(jingleId, chunkIndex, payload)`.
pub fn decode_jingle_frame(frame: &[u8]) -> Option<(u32, u32, &[u8])> {
    if frame.len() < JINGLE_HEADER_LEN {
        return None;
    }
    let jingle_id = u32::from_le_bytes(frame[0..4].try_into().ok()?);
    let chunk_index = u32::from_le_bytes(frame[4..8].try_into().ok()?);
    Some((jingle_id, chunk_index, &frame[JINGLE_HEADER_LEN..]))
}
