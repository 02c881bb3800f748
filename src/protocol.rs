/// The four wire protocols this crate can recover message boundaries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    WebSocket,
    Grpc,
    Json,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "websocket",
            Self::Grpc => "grpc",
            Self::Json => "json",
        }
    }

    pub fn from_detector_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(Self::Http),
            "websocket" => Some(Self::WebSocket),
            "grpc" => Some(Self::Grpc),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
