//! Method tokens and common MIME types for filling in [`Requests`](crate::Requests).

pub const GET: &str = "GET";
pub const HEAD: &str = "HEAD";
pub const POST: &str = "POST";
pub const PUT: &str = "PUT";
pub const PATCH: &str = "PATCH";
pub const DELETE: &str = "DELETE";
pub const CONNECT: &str = "CONNECT";
pub const OPTIONS: &str = "OPTIONS";
pub const TRACE: &str = "TRACE";

pub mod mime {
    pub const APPLICATION_MSWORD: &str = "application/msword";
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
    pub const APPLICATION_ODA: &str = "application/oda";
    pub const APPLICATION_PDF: &str = "application/pdf";
    pub const APPLICATION_VND_MS_EXCEL: &str = "application/vnd.ms-excel";
    pub const APPLICATION_VND_MS_POWERPOINT: &str = "application/vnd.ms-powerpoint";
    pub const APPLICATION_X_JAVASCRIPT: &str = "application/x-javascript";
    pub const APPLICATION_XHTML: &str = "application/xhtml+xml";
    pub const APPLICATION_ZIP: &str = "application/zip";
    pub const APPLICATION_XML: &str = "application/xml";
    pub const APPLICATION_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const APPLICATION_JSON: &str = "application/json";
    pub const IMAGE_BMP: &str = "image/bmp";
    pub const IMAGE_GIF: &str = "image/gif";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_PNG: &str = "image/png";
    pub const TEXT_CSS: &str = "text/css";
    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_XML: &str = "text/xml";
}
