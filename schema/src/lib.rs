pub mod codex;

pub use codex::{
    ChatCompletionsRequest, CodexErrorBody, ResponsesRequestBody, build_responses_request,
};
