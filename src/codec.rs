//! Length-prefixed encoding of requests and responses inside a fixture
//!
//! Request layout (little endian):
//! `method_len:u16 method url_len:u32 url header_count:u16
//!  (name_len:u16 name value_len:u32 value)* body_len:u32 body`
//!
//! Responses replace method and URL with `status:u16`.

use bytes::Bytes;

use crate::transport::{Request, Response};
use crate::{Result, TapedeckError};

/// Encode a request for storage
///
/// # Errors
///
/// Returns error if a field does not fit its length prefix
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(64 + request.url.len() + request.body.len());

    put_u16_prefixed(&mut data, request.method.as_bytes(), "method")?;
    put_u32_prefixed(&mut data, request.url.as_bytes(), "url")?;
    put_headers(&mut data, &request.headers)?;
    put_u32_prefixed(&mut data, &request.body, "request body")?;

    Ok(data)
}

/// Encode a response for storage
///
/// # Errors
///
/// Returns error if a field does not fit its length prefix
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(32 + response.body.len());

    data.extend_from_slice(&response.status.to_le_bytes());
    put_headers(&mut data, &response.headers)?;
    put_u32_prefixed(&mut data, &response.body, "response body")?;

    Ok(data)
}

/// Decode a stored request
///
/// # Errors
///
/// Returns error if the data is truncated or has trailing bytes
pub fn decode_request(data: &[u8]) -> Result<Request> {
    let mut decoder = Decoder::new(data);

    let method = decoder.string_u16("method")?;
    let url = decoder.string_u32("url")?;
    let headers = decoder.headers()?;
    let body = decoder.bytes_u32("request body")?;
    decoder.finish()?;

    Ok(Request {
        method,
        url,
        headers,
        body,
    })
}

/// Decode a stored response
///
/// # Errors
///
/// Returns error if the data is truncated or has trailing bytes
pub fn decode_response(data: &[u8]) -> Result<Response> {
    let mut decoder = Decoder::new(data);

    let status = decoder.u16("status")?;
    let headers = decoder.headers()?;
    let body = decoder.bytes_u32("response body")?;
    decoder.finish()?;

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn put_u16_prefixed(data: &mut Vec<u8>, value: &[u8], field: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| TapedeckError::InvalidFormat(format!("{field} too long: {}", value.len())))?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(value);
    Ok(())
}

fn put_u32_prefixed(data: &mut Vec<u8>, value: &[u8], field: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| TapedeckError::InvalidFormat(format!("{field} too long: {}", value.len())))?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(value);
    Ok(())
}

fn put_headers(data: &mut Vec<u8>, headers: &[(String, String)]) -> Result<()> {
    let count = u16::try_from(headers.len()).map_err(|_| {
        TapedeckError::InvalidFormat(format!("Too many headers: {}", headers.len()))
    })?;
    data.extend_from_slice(&count.to_le_bytes());

    for (name, value) in headers {
        put_u16_prefixed(data, name.as_bytes(), "header name")?;
        put_u32_prefixed(data, value.as_bytes(), "header value")?;
    }
    Ok(())
}

/// Bounds-checked cursor over encoded data
struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| TapedeckError::InvalidFormat(format!("Missing {field}")))?;

        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u16(&mut self, field: &str) -> Result<u16> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string_u16(&mut self, field: &str) -> Result<String> {
        let len = self.u16(field)? as usize;
        let bytes = self.take(len, field)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn string_u32(&mut self, field: &str) -> Result<String> {
        let len = self.u32(field)? as usize;
        let bytes = self.take(len, field)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn bytes_u32(&mut self, field: &str) -> Result<Bytes> {
        let len = self.u32(field)? as usize;
        Ok(Bytes::copy_from_slice(self.take(len, field)?))
    }

    fn headers(&mut self) -> Result<Vec<(String, String)>> {
        let count = self.u16("header count")?;
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.string_u16("header name")?;
            let value = self.string_u32("header value")?;
            headers.push((name, value));
        }
        Ok(headers)
    }

    fn finish(self) -> Result<()> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(TapedeckError::InvalidFormat(format!(
                "{} trailing bytes",
                self.data.len() - self.offset
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = Request::new("POST", "http://localhost/api/rest/v1/users")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"a"}"#);

        let data = encode_request(&request).unwrap();
        assert_eq!(decode_request(&data).unwrap(), request);
    }

    #[test]
    fn test_decode_response_layout() {
        let mut data = Vec::new();

        // Status: 200
        data.extend_from_slice(&200u16.to_le_bytes());

        // Headers: 1 header
        data.extend_from_slice(&1u16.to_le_bytes());

        // Header name: "Content-Type" (12 bytes)
        data.extend_from_slice(&12u16.to_le_bytes());
        data.extend_from_slice(b"Content-Type");

        // Header value: "text/plain" (10 bytes)
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(b"text/plain");

        // Body: "Hello" (5 bytes)
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(b"Hello");

        let response = decode_response(&data).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body, Bytes::from_static(b"Hello"));
        assert_eq!(encode_response(&response).unwrap(), data);
    }

    #[test]
    fn test_decode_truncated() {
        let response = Response::new(404, "not found");
        let data = encode_response(&response).unwrap();

        let result = decode_response(&data[..data.len() - 1]);
        assert!(matches!(result, Err(TapedeckError::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut data = encode_response(&Response::new(204, "")).unwrap();
        data.push(0);

        assert!(decode_response(&data).is_err());
    }

    #[test]
    fn test_oversized_method_rejected() {
        let request = Request::new("X".repeat(70_000), "http://localhost/");
        assert!(encode_request(&request).is_err());
    }
}
