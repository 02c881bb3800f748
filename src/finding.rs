/// How serious a [`Finding`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A single reference to the frame a finding's evidence came from, by
/// position within its session rather than a pointer, so findings never
/// need to outlive or alias the frames they describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    pub index: usize,
}

/// A security observation attached to a frame or a session.
#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: String,
    pub severity: Severity,
    pub confidence: f64,
    pub evidence: String,
    pub frame_refs: Vec<FrameRef>,
    pub description: String,
}

impl Finding {
    pub fn new(kind: impl Into<String>, severity: Severity, confidence: f64, evidence: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            confidence,
            evidence: evidence.into(),
            frame_refs: Vec::new(),
            description: description.into(),
        }
    }

    pub fn with_frame_refs(mut self, frame_refs: Vec<FrameRef>) -> Self {
        self.frame_refs = frame_refs;
        self
    }
}
