pub mod helpers;
pub mod mock_llm;
pub mod mock_search;

pub use helpers::*;
pub use mock_llm::MockLanguageModel;
pub use mock_search::{sample_result, MockSearch};
