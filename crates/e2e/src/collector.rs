//! Reading price text from page elements

use async_trait::async_trait;

use crate::error::{E2eError, E2eResult};
use crate::price::extract_price;
use crate::sort::PriceList;

/// Something that can yield its rendered text, usually a DOM element.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// `None` when the element has no text content.
    async fn text_content(&self) -> E2eResult<Option<String>>;
}

#[async_trait]
impl TextSource for String {
    async fn text_content(&self) -> E2eResult<Option<String>> {
        Ok(Some(self.clone()))
    }
}

#[async_trait]
impl TextSource for &str {
    async fn text_content(&self) -> E2eResult<Option<String>> {
        Ok(Some((*self).to_string()))
    }
}

/// Read every source in order and parse its price.
///
/// Stops at the first text that does not parse; no partial list is returned.
pub async fn collect_all<S: TextSource>(sources: &[S]) -> E2eResult<PriceList> {
    let mut prices = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let text = source.text_content().await?.unwrap_or_default();
        let price = extract_price(&text).map_err(|source| E2eError::PriceParse {
            index,
            text: text.clone(),
            source,
        })?;
        prices.push(price);
    }

    Ok(PriceList::new(prices))
}
