pub mod chat;
pub mod dashboard;
pub mod notice;
pub mod poller;
pub mod upload;

pub use chat::{AskOutcome, ChatSession, ChatState};
pub use dashboard::{Dashboard, DashboardOptions};
pub use notice::{notice_for, Notice, NoticeBoard};
pub use poller::{DocumentCollection, DocumentPoller};
pub use upload::prepare_upload;
