//! Field extraction for one listing fragment.
//!
//! Every sub-field is parsed independently: a missing or malformed value
//! degrades to `None`/empty and the rest of the record is still extracted.
//! Two hard gates reject the whole fragment instead: the model-year
//! threshold and price resolution.

use anyhow::Result;
use scraper::{ElementRef, Selector};

use crate::models::Listing;
use crate::traits::SiteSelectors;

/// Why a fragment produced no record. Business-rule rejections are
/// expected and frequent; only `Malformed` points at bad markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPrice,
    SoldOrOffer,
    YearOutOfRange,
    Malformed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPrice => write!(f, "no price advertised"),
            Self::SoldOrOffer => write!(f, "sold or under offer"),
            Self::YearOutOfRange => write!(f, "year out of range"),
            Self::Malformed => write!(f, "malformed fragment"),
        }
    }
}

pub struct Extractor {
    title_link: Selector,
    stock_no: Selector,
    mileage: Selector,
    year: Selector,
    engine: Selector,
    transmission: Selector,
    location: Selector,
    spec_table: Selector,
    table_row: Selector,
    table_cell: Selector,
    fuel_cell: Selector,
    seats_cell: Selector,
    price: Selector,
    year_threshold: i64,
}

impl Extractor {
    pub fn new(selectors: &SiteSelectors, year_threshold: i64) -> Result<Self> {
        Ok(Self {
            title_link: parse_selector(selectors.title_link)?,
            stock_no: parse_selector(selectors.stock_no)?,
            mileage: parse_selector(selectors.mileage)?,
            year: parse_selector(selectors.year)?,
            engine: parse_selector(selectors.engine)?,
            transmission: parse_selector(selectors.transmission)?,
            location: parse_selector(selectors.location)?,
            spec_table: parse_selector(selectors.spec_table)?,
            table_row: parse_selector("tr")?,
            table_cell: parse_selector("td")?,
            fuel_cell: parse_selector(selectors.fuel_cell)?,
            seats_cell: parse_selector(selectors.seats_cell)?,
            price: parse_selector(selectors.price)?,
            year_threshold,
        })
    }

    /// Extract one listing row into a record, or a skip reason.
    pub fn extract(&self, row: ElementRef<'_>) -> Result<Listing, SkipReason> {
        // The reference number is the primary key; a fragment without one
        // cannot be stored.
        let ref_no = match element_text(row, &self.stock_no) {
            Some(raw) => truncate_ref_no(&raw),
            None => return Err(SkipReason::Malformed),
        };

        let title_element = row.select(&self.title_link).next();
        let title = title_element
            .and_then(|el| non_empty(collect_text(el)))
            .map(|raw| rebuild_title(&raw))
            .unwrap_or_default();
        let link = title_element
            .and_then(|el| el.value().attr("href"))
            .unwrap_or_default()
            .to_string();

        let mileage = element_text(row, &self.mileage)
            .and_then(|raw| parse_int(&raw.replace("km", "").replace(',', "")));

        let year = element_text(row, &self.year)
            .and_then(|raw| parse_int(raw.replace(',', "").chars().take(4).collect::<String>().as_str()));

        // Standing business rule: listings newer than the threshold year
        // are never stored. An unparseable year does not trigger the gate.
        if let Some(year) = year
            && year > self.year_threshold
        {
            return Err(SkipReason::YearOutOfRange);
        }

        let engine_size = element_text(row, &self.engine)
            .and_then(|raw| parse_int(&raw.replace("cc", "").replace(',', "")));

        let transmission = element_text(row, &self.transmission).unwrap_or_default();
        let location = element_text(row, &self.location).unwrap_or_default();

        // Cells of the detailed-spec table, addressed positionally the way
        // the site lays them out.
        let table_rows: Vec<ElementRef<'_>> = row
            .select(&self.spec_table)
            .next()
            .map(|table| table.select(&self.table_row).collect())
            .unwrap_or_default();

        let mut engine_code = self.spec_cell(&table_rows, 1, 1).unwrap_or_default();
        if engine_code == "0" {
            engine_code.clear();
        }
        let steering = self.spec_cell(&table_rows, 1, 3).unwrap_or_default();
        let model_code = self.spec_cell(&table_rows, 2, 1).unwrap_or_default();
        let colour = self.spec_cell(&table_rows, 2, 3).unwrap_or_default();
        let drive = self.spec_cell(&table_rows, 2, 5).unwrap_or_default();
        let doors = self
            .spec_cell(&table_rows, 2, 7)
            .and_then(|raw| parse_int(&ask_as_empty(raw)));
        let auction_grade = if table_rows.len() >= 4 {
            self.spec_cell(&table_rows, table_rows.len() - 1, 1)
                .unwrap_or_default()
        } else {
            String::new()
        };

        let seats = element_text(row, &self.seats_cell)
            .and_then(|raw| parse_int(&ask_as_empty(raw)));

        let fuel_type = element_text(row, &self.fuel_cell)
            .map(|raw| map_fuel(&raw))
            .unwrap_or_default();

        // Hard gate: a listing without a resolvable price never enters the
        // store.
        let price_text = element_text(row, &self.price).ok_or(SkipReason::NoPrice)?;
        let total_price = parse_price(&price_text)?;

        Ok(Listing {
            ref_no,
            year,
            title,
            mileage,
            engine_size,
            engine_code,
            model_code,
            transmission,
            drive,
            steering,
            doors,
            seats,
            fuel_type,
            auction_grade,
            total_price,
            link,
            colour,
            location,
            notified: false,
        })
    }

    fn spec_cell(&self, rows: &[ElementRef<'_>], row: usize, cell: usize) -> Option<String> {
        rows.get(row)
            .and_then(|tr| tr.select(&self.table_cell).nth(cell))
            .and_then(|td| non_empty(collect_text(td)))
    }
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow::anyhow!("failed to parse selector {raw:?}: {e:?}"))
}

fn collect_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn element_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().and_then(|el| non_empty(collect_text(el)))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// "ASK" placeholders in spec cells mean the value is not published.
fn ask_as_empty(raw: String) -> String {
    if raw == "ASK" { String::new() } else { raw }
}

/// Strip the literal "Ref No. " prefix and keep the first 8 characters.
pub fn truncate_ref_no(raw: &str) -> String {
    raw.trim()
        .replacen("Ref No. ", "", 1)
        .chars()
        .take(8)
        .collect()
}

/// The site's title starts with the model year; drop it and keep the next
/// two tokens (make and model). Anything shorter degrades to empty.
pub fn rebuild_title(raw: &str) -> String {
    let mut tokens = raw.split_whitespace().skip(1);
    match (tokens.next(), tokens.next()) {
        (Some(make), Some(model)) => format!("{make} {model}"),
        _ => String::new(),
    }
}

/// Fixed fuel-type synonym table; unmapped values pass through unchanged.
pub fn map_fuel(raw: &str) -> String {
    match raw {
        "Hybrid(Petrol)" => "Petrol",
        "Hybrid(Diesel)" => "Diesel",
        "Electric" => "Electric",
        "Other" => "",
        "LPG" => "Petrol",
        "CNG" => "CNG",
        other => other,
    }
    .to_string()
}

/// Resolve the advertised price or reject the listing.
pub fn parse_price(raw: &str) -> Result<f64, SkipReason> {
    let upper = raw.to_uppercase();
    if upper.contains("SOLD") || upper.contains("UNDER OFFER") {
        return Err(SkipReason::SoldOrOffer);
    }

    let cleaned = raw.replace('$', "").replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned == "ASK" {
        return Err(SkipReason::NoPrice);
    }

    cleaned
        .parse::<f64>()
        .map(|price| (price * 100.0).round() / 100.0)
        .map_err(|_| SkipReason::Malformed)
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    fn extractor(year_threshold: i64) -> Extractor {
        Extractor::new(&SiteSelectors::default(), year_threshold).unwrap()
    }

    fn listing_row(year: &str, price: &str) -> String {
        format!(
            r#"<div class="stocklist-row">
                <div class="make-model"><a href="https://example.com/vehicle/BM700551">{year} TOYOTA COROLLA</a></div>
                <span class="veh-stock-no">Ref No. BM700551-extra</span>
                <div class="mileage"><p class="val">92,000km</p></div>
                <div class="year"><p class="val">{year}</p></div>
                <div class="engine"><p class="val">1,500cc</p></div>
                <div class="trans"><p class="val">AT</p></div>
                <p class="val stock-area">Kobe</p>
                <table class="table-detailed-spec">
                    <tr><td>h</td><td>h</td><td>h</td><td>h</td></tr>
                    <tr><td>Engine code</td><td>1NZ-FE</td><td>Steering</td><td>RHD</td></tr>
                    <tr><td>Model code</td><td>NZE121</td><td>Colour</td><td>Silver</td>
                        <td>Drive</td><td>2WD</td><td>Doors</td><td>4</td></tr>
                    <tr><td>Grade</td><td>4</td></tr>
                </table>
                <table><tr><td class="td-3rd">Hybrid(Petrol)</td><td class="td-4th">5</td></tr></table>
                <p class="total-price">{price}</p>
            </div>"#
        )
    }

    fn extract_fragment(html: &str, year_threshold: i64) -> Result<Listing, SkipReason> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse(".stocklist-row").unwrap();
        let row = document.select(&row_selector).next().unwrap();
        extractor(year_threshold).extract(row)
    }

    #[test]
    fn extracts_full_record() {
        let listing = extract_fragment(&listing_row("2005", "$12,345"), 2009).unwrap();
        assert_eq!(listing.ref_no, "BM700551");
        assert_eq!(listing.title, "TOYOTA COROLLA");
        assert_eq!(listing.year, Some(2005));
        assert_eq!(listing.mileage, Some(92_000));
        assert_eq!(listing.engine_size, Some(1_500));
        assert_eq!(listing.engine_code, "1NZ-FE");
        assert_eq!(listing.model_code, "NZE121");
        assert_eq!(listing.steering, "RHD");
        assert_eq!(listing.colour, "Silver");
        assert_eq!(listing.drive, "2WD");
        assert_eq!(listing.doors, Some(4));
        assert_eq!(listing.seats, Some(5));
        assert_eq!(listing.fuel_type, "Petrol");
        assert_eq!(listing.auction_grade, "4");
        assert_eq!(listing.total_price, 12_345.0);
        assert_eq!(listing.link, "https://example.com/vehicle/BM700551");
        assert_eq!(listing.location, "Kobe");
        assert!(!listing.notified);
    }

    #[test]
    fn year_above_threshold_is_skipped() {
        let result = extract_fragment(&listing_row("2015", "$12,345"), 2009);
        assert_eq!(result.unwrap_err(), SkipReason::YearOutOfRange);
    }

    #[test]
    fn unparseable_year_does_not_trigger_the_gate() {
        let listing = extract_fragment(&listing_row("n/a", "$9,800"), 2009).unwrap();
        assert_eq!(listing.year, None);
    }

    #[test]
    fn sold_markers_reject_the_record_any_case() {
        for price in ["SOLD", "Sold out", "under offer"] {
            let result = extract_fragment(&listing_row("2005", price), 2009);
            assert_eq!(result.unwrap_err(), SkipReason::SoldOrOffer, "price {price:?}");
        }
    }

    #[test]
    fn ask_price_rejects_the_record() {
        let result = extract_fragment(&listing_row("2005", "ASK"), 2009);
        assert_eq!(result.unwrap_err(), SkipReason::NoPrice);
    }

    #[test]
    fn unparseable_price_is_malformed() {
        let result = extract_fragment(&listing_row("2005", "call us"), 2009);
        assert_eq!(result.unwrap_err(), SkipReason::Malformed);
    }

    #[test]
    fn missing_ref_no_is_malformed() {
        let html = r#"<div class="stocklist-row"><p class="total-price">$5,000</p></div>"#;
        let result = extract_fragment(html, 2009);
        assert_eq!(result.unwrap_err(), SkipReason::Malformed);
    }

    #[test]
    fn missing_price_element_rejects_the_record() {
        let html = r#"<div class="stocklist-row">
            <span class="veh-stock-no">Ref No. BM700551</span>
        </div>"#;
        let result = extract_fragment(html, 2009);
        assert_eq!(result.unwrap_err(), SkipReason::NoPrice);
    }

    #[test]
    fn price_parses_to_two_decimals() {
        assert_eq!(parse_price("$12,345").unwrap(), 12_345.0);
        assert_eq!(parse_price("1234.567").unwrap(), 1_234.57);
    }

    #[test]
    fn fuel_mapping_is_fixed_with_pass_through() {
        assert_eq!(map_fuel("Hybrid(Diesel)"), "Diesel");
        assert_eq!(map_fuel("Hybrid(Petrol)"), "Petrol");
        assert_eq!(map_fuel("LPG"), "Petrol");
        assert_eq!(map_fuel("Other"), "");
        assert_eq!(map_fuel("Unknown"), "Unknown");
    }

    #[test]
    fn ref_no_is_stripped_and_truncated() {
        assert_eq!(truncate_ref_no("Ref No. BM700551-09231"), "BM700551");
        assert_eq!(truncate_ref_no("BM1234"), "BM1234");
    }

    #[test]
    fn title_drops_year_and_keeps_two_tokens() {
        assert_eq!(rebuild_title("2005 TOYOTA COROLLA X"), "TOYOTA COROLLA");
        assert_eq!(rebuild_title("TOYOTA"), "");
    }
}
