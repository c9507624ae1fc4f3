pub mod scraper;
pub mod storage;
