mod url_record;

pub use url_record::{
    BatchShortenItemDto, BatchShortenResultDto, ShortenRequestDto, ShortenResponseDto,
    UrlRecord, UserUrlDto,
};
