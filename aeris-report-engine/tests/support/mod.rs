pub mod span_capture;
