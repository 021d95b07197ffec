pub mod google;
pub mod openai;
pub mod utils;
