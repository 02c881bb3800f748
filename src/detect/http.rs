use super::DetectOutcome;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Finds HTTP/1.x request/response boundaries: headers terminated by
/// `\r\n\r\n`, then a body sized by `Content-Length` or consumed chunk by
/// chunk per `Transfer-Encoding: chunked`.
#[derive(Default)]
pub struct HttpDetector;

impl HttpDetector {
    pub fn new() -> Self {
        Self
    }
}

impl super::BoundaryDetector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&mut self, data: &[u8]) -> DetectOutcome {
        let header_end = match find_subslice(data, HEADER_TERMINATOR) {
            Some(idx) => idx + HEADER_TERMINATOR.len(),
            None => return DetectOutcome::NeedMoreData,
        };
        let headers = &data[..header_end];

        if let Some(value) = header_value(headers, b"transfer-encoding") {
            if ascii_contains_ignore_case(value, b"chunked") {
                return detect_chunked_body(data, header_end);
            }
        }

        let content_length = match header_value(headers, b"content-length") {
            Some(value) => match std::str::from_utf8(value).ok().and_then(|s| s.trim().parse::<usize>().ok()) {
                Some(n) => n,
                None => return DetectOutcome::Invalid,
            },
            None => 0,
        };

        let total = header_end + content_length;
        if data.len() < total {
            DetectOutcome::NeedMoreData
        } else {
            DetectOutcome::Found { size: total }
        }
    }

    fn reset(&mut self) {}
}

/// Walks chunk-size lines starting at `body_start` until a zero-length
/// chunk's trailing `\r\n` (and any trailer headers up to a final blank
/// line) have been consumed.
fn detect_chunked_body(data: &[u8], body_start: usize) -> DetectOutcome {
    let mut pos = body_start;
    loop {
        let line_end = match find_subslice(&data[pos..], b"\r\n") {
            Some(idx) => pos + idx,
            None => return DetectOutcome::NeedMoreData,
        };
        let size_line = &data[pos..line_end];
        let size_str = match size_line.iter().position(|&b| b == b';') {
            Some(semi) => &size_line[..semi],
            None => size_line,
        };
        let chunk_size = match std::str::from_utf8(size_str)
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
        {
            Some(n) => n,
            None => return DetectOutcome::Invalid,
        };

        let chunk_data_start = line_end + 2;
        if chunk_size == 0 {
            // Zero-size chunk: consume trailer headers up to the final
            // blank line.
            return match find_subslice(&data[chunk_data_start..], HEADER_TERMINATOR) {
                Some(idx) => DetectOutcome::Found { size: chunk_data_start + idx + HEADER_TERMINATOR.len() },
                None => {
                    // No trailers at all is the common case: a bare \r\n.
                    if data[chunk_data_start..].starts_with(b"\r\n") {
                        DetectOutcome::Found { size: chunk_data_start + 2 }
                    } else {
                        DetectOutcome::NeedMoreData
                    }
                }
            };
        }

        let chunk_end = chunk_data_start + chunk_size + 2; // + trailing CRLF
        if data.len() < chunk_end {
            return DetectOutcome::NeedMoreData;
        }
        pos = chunk_end;
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Case-insensitive header lookup. Returns the trimmed value bytes for the
/// first header line whose name matches `name`.
fn header_value<'a>(headers: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    for line in headers.split(|&b| b == b'\n') {
        let line = strip_trailing_cr(line);
        let colon = line.iter().position(|&b| b == b':')?;
        let (key, rest) = line.split_at(colon);
        if key.eq_ignore_ascii_case(name) {
            return Some(trim_ascii(&rest[1..]));
        }
    }
    None
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

fn ascii_contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
}
