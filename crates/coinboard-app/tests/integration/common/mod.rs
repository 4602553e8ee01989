pub mod mock_http;
pub mod mock_ws;
