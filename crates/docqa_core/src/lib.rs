pub mod domain;
pub mod ports;

pub use domain::{
    Answer, ChatScope, CredentialPair, Document, DocumentId, DocumentStatus, DocumentUpload,
    Message, MessageId, Role, Source, UploadFile, ValidationError,
};
pub use ports::{
    ApiRequest, ApiResponse, DocumentService, HttpMethod, HttpTransport, PortError, PortResult,
    QuestionService, RequestBody, TokenStore,
};
