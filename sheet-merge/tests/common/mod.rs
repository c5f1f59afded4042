#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use rust_xlsxwriter::{
    ConditionalFormatCell, ConditionalFormatCellRule, DataValidation, Format, FormatAlign,
    FormatBorder, Workbook as Writer,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as the mock server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: "application/octet-stream",
            body,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::bytes(status, Vec::new())
    }
}

/// In-process HTTP/1.1 server answering every connection with `handler`.
/// Each response closes its connection.
pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _peer)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    serve(socket, recorded, handler.as_ref()).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}/v1.0"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

async fn serve<F>(mut socket: TcpStream, recorded: Arc<Mutex<Vec<RecordedRequest>>>, handler: &F)
where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let mut buf = [0u8; 8192];
    let mut raw = Vec::new();
    let header_end = loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[header_end..].to_vec();
    while body.len() < length {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&buf[..n]),
        }
    }

    let request = RecordedRequest {
        method,
        path,
        headers,
        body,
    };
    let response = handler(&request);
    recorded.lock().unwrap().push(request);

    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let head = format!(
        "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&response.body).await;
    let _ = socket.shutdown().await;
}

/// `driveItem` body as returned by `/shares/{token}/driveItem`
pub fn drive_item(web_url: &str) -> Value {
    serde_json::json!({
        "id": "01ITEM",
        "name": "Observations.xlsx",
        "webUrl": web_url,
        "parentReference": { "driveId": "b!drive" }
    })
}

/// Merged ranges on "Template"
pub const TEMPLATE_MERGES: usize = 2;
/// Conditional format rules on "Template", all bound to `C6:C30`
pub const TEMPLATE_CONDITIONAL_RULES: usize = 2;

/// A workbook shaped like an observation template:
///
/// - "Template": A1 bold red and merged A1:B1, custom heights on rows 1-3,
///   column G hidden, two conditional formats and a list validation on the
///   rating column, landscape, print area A1:E30
/// - "Admin Template": a plainer copy for admin visits
/// - "Notes": a sheet no merge touches
pub fn template_workbook() -> Vec<u8> {
    let mut writer = Writer::new();

    let sheet = writer.add_worksheet();
    sheet.set_name("Template").unwrap();
    let title = Format::new().set_bold().set_font_color("#FF0000");
    let heading = Format::new().set_bold().set_background_color("#D9E1F2");
    let boxed = Format::new()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Top);
    sheet.merge_range(0, 0, 0, 1, "Teacher Observation", &title).unwrap();
    sheet.merge_range(4, 0, 4, 4, "Domain 1: Planning", &heading).unwrap();
    sheet.write_string(1, 0, "Teacher").unwrap();
    sheet.write_string(1, 2, "Observer").unwrap();
    sheet.write_string(2, 0, "Date").unwrap();
    sheet.write_string(2, 2, "Subject").unwrap();
    for row in 5..30 {
        for col in 0..5 {
            sheet.write_blank(row, col, &boxed).unwrap();
        }
    }
    sheet.write_string_with_format(5, 0, "1a", &boxed).unwrap();
    sheet.set_row_height(0, 28).unwrap();
    sheet.set_row_height(1, 20).unwrap();
    sheet.set_row_height(2, 20).unwrap();
    sheet.set_column_width(1, 45).unwrap();
    sheet.set_column_width(3, 35).unwrap();
    sheet.set_column_width(4, 35).unwrap();
    sheet.write_string(0, 6, "internal").unwrap();
    sheet.set_column_hidden(6).unwrap();
    sheet.set_landscape();
    sheet.set_print_area(0, 0, 29, 4).unwrap();

    let low = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::LessThan(2))
        .set_format(Format::new().set_font_color("#9C0006"));
    let high = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::GreaterThanOrEqualTo(4))
        .set_format(Format::new().set_font_color("#006100"));
    sheet.add_conditional_format(5, 2, 29, 2, &low).unwrap();
    sheet.add_conditional_format(5, 2, 29, 2, &high).unwrap();
    let ratings = DataValidation::new()
        .allow_list_strings(&["1", "2", "3", "4"])
        .unwrap();
    sheet.add_data_validation(5, 2, 29, 2, &ratings).unwrap();

    let admin = writer.add_worksheet();
    admin.set_name("Admin Template").unwrap();
    admin.merge_range(0, 0, 0, 3, "Admin Support Visit", &title).unwrap();
    for row in 5..11 {
        for col in 0..5 {
            admin.write_blank(row, col, &boxed).unwrap();
        }
    }

    let notes = writer.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Do not edit").unwrap();
    notes.write_number(1, 0, 42).unwrap();

    writer.save_to_buffer().unwrap()
}
