//! Movie/person lookup flows and attachment formatting.
//!
//! Free-text lookups go through multi search and branch on the first result's
//! media type; slash commands use the typed movie/person searches. An empty
//! result list surfaces as `Ok(None)` so callers can send the quoted
//! "no results" reply; remote failures surface as `TmdbError` and produce no
//! reply at all.

use crate::channels::{Attachment, AttachmentField, OutboundMessage};
use crate::tmdb::{
    Credits, ImageConfiguration, MovieDetail, PersonDetail, SearchResult, TmdbClient, TmdbError,
};
use chrono::{Datelike, Local, NaiveDate};

/// Reply text prefix for a successful lookup.
pub fn found_text(query: &str) -> String {
    format!("This is what I found for “{}”", query)
}

/// The single reply sent when a search returns nothing.
pub fn no_results_reply(query: &str) -> OutboundMessage {
    OutboundMessage::text(format!("No results found for “{}”.", query))
}

/// Multi-type lookup: search, take the first result, branch on media type.
pub async fn lookup_any(
    tmdb: &TmdbClient,
    images: &ImageConfiguration,
    query: &str,
) -> Result<Option<OutboundMessage>, TmdbError> {
    let res = tmdb.search_multi(query).await?;
    let Some(first) = res.results.into_iter().next() else {
        return Ok(None);
    };
    match first.media_type.as_deref() {
        Some("movie") => {
            let detail = tmdb.movie(first.id).await?;
            let credits = tmdb.movie_credits(first.id).await?;
            Ok(Some(OutboundMessage::with_attachment(
                found_text(query),
                movie_attachment(&detail, &credits, images),
            )))
        }
        Some("person") => {
            let detail = tmdb.person(first.id).await?;
            Ok(Some(OutboundMessage::with_attachment(
                found_text(query),
                person_attachment(&first, &detail, images, Local::now().date_naive()),
            )))
        }
        Some("tv") => Ok(Some(OutboundMessage::with_attachment(
            found_text(query),
            show_attachment(&first, images),
        ))),
        other => {
            log::debug!("multi search returned unhandled media type {:?}", other);
            Ok(None)
        }
    }
}

/// Movie lookup for the /movie command. Input is "title" or "title,year".
pub async fn lookup_movie(
    tmdb: &TmdbClient,
    images: &ImageConfiguration,
    text: &str,
) -> Result<Option<OutboundMessage>, TmdbError> {
    let (title, year) = match text.split_once(',') {
        Some((t, y)) => (t.trim(), Some(y.trim())),
        None => (text.trim(), None),
    };
    let res = tmdb.search_movie(title, year.filter(|y| !y.is_empty())).await?;
    let Some(first) = res.results.into_iter().next() else {
        return Ok(None);
    };
    let detail = tmdb.movie(first.id).await?;
    let credits = tmdb.movie_credits(first.id).await?;
    Ok(Some(OutboundMessage::with_attachment(
        found_text(text),
        movie_attachment(&detail, &credits, images),
    )))
}

/// Person lookup for the /actor command.
pub async fn lookup_person(
    tmdb: &TmdbClient,
    images: &ImageConfiguration,
    query: &str,
) -> Result<Option<OutboundMessage>, TmdbError> {
    let res = tmdb.search_person(query).await?;
    let Some(first) = res.results.into_iter().next() else {
        return Ok(None);
    };
    let detail = tmdb.person(first.id).await?;
    Ok(Some(OutboundMessage::with_attachment(
        found_text(query),
        person_attachment(&first, &detail, images, Local::now().date_naive()),
    )))
}

/// Movie attachment: title "(year)", IMDB link, poster thumb, overview, and
/// Released / Runtime / Cast / Rating fields.
pub fn movie_attachment(
    detail: &MovieDetail,
    credits: &Credits,
    images: &ImageConfiguration,
) -> Attachment {
    let year = year_of(detail.release_date.as_deref());
    let title = match year {
        Some(y) => format!("{} ({})", detail.original_title, y),
        None => detail.original_title.clone(),
    };
    let released = detail
        .release_date
        .as_deref()
        .and_then(long_date)
        .unwrap_or_else(|| "Unknown".to_string());
    let runtime = detail
        .runtime
        .map(|m| format!("{} min", m))
        .unwrap_or_else(|| "unknown".to_string());
    let cast = credits
        .cast
        .iter()
        .take(4)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let rating = format!(
        "{}/10 ({})",
        detail.vote_average.unwrap_or(0.0),
        detail.vote_count.unwrap_or(0)
    );
    Attachment {
        title: Some(title),
        title_link: detail
            .imdb_id
            .as_deref()
            .map(|id| format!("http://www.imdb.com/title/{}", id)),
        thumb_url: images.poster_url(detail.poster_path.as_deref()),
        text: detail.overview.clone(),
        fields: vec![
            AttachmentField::short("Released", released),
            AttachmentField::short("Runtime", runtime),
            AttachmentField::short("Cast", cast),
            AttachmentField::short("TMDB Rating", rating),
        ],
        ..Default::default()
    }
}

/// Person attachment: name, homepage link, profile thumb, biography, and
/// Age / Hometown / Known For fields.
pub fn person_attachment(
    result: &SearchResult,
    detail: &PersonDetail,
    images: &ImageConfiguration,
    today: NaiveDate,
) -> Attachment {
    let age = age_text(detail.birthday.as_deref(), detail.deathday.as_deref(), today);
    let hometown = detail
        .place_of_birth
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    let known_for = result
        .known_for
        .iter()
        .map(|k| {
            let title = k
                .original_title
                .as_deref()
                .or(k.name.as_deref())
                .unwrap_or("Untitled");
            let year = year_of(k.release_date.as_deref()).unwrap_or("?".to_string());
            format!("{} ({})  _{}/10_", title, year, k.vote_average.unwrap_or(0.0))
        })
        .collect::<Vec<_>>()
        .join("\n");
    Attachment {
        title: Some(detail.name.clone()),
        title_link: detail.homepage.clone().filter(|h| !h.is_empty()),
        thumb_url: images.profile_url(detail.profile_path.as_deref()),
        text: detail.biography.clone(),
        fields: vec![
            AttachmentField::short("Age", age),
            AttachmentField::short("Hometown", hometown),
            AttachmentField::long("Known For", known_for),
        ],
        mrkdwn_in: vec![
            "text".to_string(),
            "pretext".to_string(),
            "fields".to_string(),
        ],
        ..Default::default()
    }
}

/// Show attachment built from the multi-search result alone.
pub fn show_attachment(result: &SearchResult, images: &ImageConfiguration) -> Attachment {
    let name = result.name.as_deref().unwrap_or("Untitled").to_string();
    let title = match year_of(result.first_air_date.as_deref()) {
        Some(y) => format!("{} ({})", name, y),
        None => name,
    };
    let first_aired = result
        .first_air_date
        .as_deref()
        .and_then(long_date)
        .unwrap_or_else(|| "Unknown".to_string());
    Attachment {
        title: Some(title),
        thumb_url: images.poster_url(result.poster_path.as_deref()),
        text: result.overview.clone(),
        fields: vec![
            AttachmentField::short("First aired", first_aired),
            AttachmentField::short(
                "TMDB Rating",
                format!("{}/10", result.vote_average.unwrap_or(0.0)),
            ),
        ],
        ..Default::default()
    }
}

/// "Age" field value: years plus a born/deceased annotation.
fn age_text(birthday: Option<&str>, deathday: Option<&str>, today: NaiveDate) -> String {
    let Some(birth) = birthday.and_then(parse_date) else {
        return "Unknown".to_string();
    };
    let death = deathday.and_then(parse_date);
    let end = death.unwrap_or(today);
    let age = years_between(birth, end);
    match death {
        Some(d) => format!("{} _Deceased, {} - {}_", age, birth.year(), d.year()),
        None => format!("{} _Born {}_", age, short_date(birth)),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Whole years between two dates (birthday arithmetic).
fn years_between(from: NaiveDate, to: NaiveDate) -> i32 {
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    years
}

/// Four-digit year prefix of a "YYYY-MM-DD" string. Remote dates are not
/// trusted: a prefix that is not sliceable at a char boundary yields None.
fn year_of(date: Option<&str>) -> Option<String> {
    date.and_then(|d| d.get(..4)).map(str::to_string)
}

fn day_ordinal(day: u32) -> &'static str {
    match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}

/// "Friday, June 25th 1982" from "1982-06-25".
fn long_date(date: &str) -> Option<String> {
    let d = parse_date(date)?;
    Some(format!(
        "{}, {} {}{} {}",
        d.format("%A"),
        d.format("%B"),
        d.day(),
        day_ordinal(d.day()),
        d.year()
    ))
}

/// "Jul 13th, 1942" from "1942-07-13".
fn short_date(d: NaiveDate) -> String {
    format!("{} {}{}, {}", d.format("%b"), d.day(), day_ordinal(d.day()), d.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmdb::{CastMember, KnownFor};

    fn images() -> ImageConfiguration {
        serde_json::from_str(
            r#"{
                "base_url": "https://image.tmdb.org/t/p/",
                "poster_sizes": ["w92", "w154"],
                "profile_sizes": ["w45", "w185"]
            }"#,
        )
        .unwrap()
    }

    fn blade_runner() -> MovieDetail {
        serde_json::from_str(
            r#"{
                "id": 78,
                "original_title": "Blade Runner",
                "imdb_id": "tt0083658",
                "release_date": "1982-06-25",
                "poster_path": "/poster.jpg",
                "overview": "A blade runner must pursue replicants.",
                "runtime": 117,
                "vote_average": 7.9,
                "vote_count": 1234
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn ordinals_cover_the_teens() {
        assert_eq!(day_ordinal(1), "st");
        assert_eq!(day_ordinal(2), "nd");
        assert_eq!(day_ordinal(3), "rd");
        assert_eq!(day_ordinal(4), "th");
        assert_eq!(day_ordinal(11), "th");
        assert_eq!(day_ordinal(12), "th");
        assert_eq!(day_ordinal(13), "th");
        assert_eq!(day_ordinal(21), "st");
        assert_eq!(day_ordinal(22), "nd");
        assert_eq!(day_ordinal(23), "rd");
    }

    #[test]
    fn long_date_formats_ordinal_day() {
        assert_eq!(
            long_date("1982-06-25").as_deref(),
            Some("Friday, June 25th 1982")
        );
        assert_eq!(long_date("not-a-date"), None);
    }

    #[test]
    fn age_counts_whole_years() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 12).unwrap();
        let birth = NaiveDate::from_ymd_opt(1942, 7, 13).unwrap();
        // One day before the birthday.
        assert_eq!(years_between(birth, today), 81);
        let today = NaiveDate::from_ymd_opt(2024, 7, 13).unwrap();
        assert_eq!(years_between(birth, today), 82);
    }

    #[test]
    fn age_text_living_and_deceased() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            age_text(Some("1942-07-13"), None, today),
            "81 _Born Jul 13th, 1942_"
        );
        assert_eq!(
            age_text(Some("1899-01-23"), Some("1957-01-14"), today),
            "57 _Deceased, 1899 - 1957_"
        );
        assert_eq!(age_text(None, None, today), "Unknown");
    }

    #[test]
    fn movie_attachment_truncates_cast_and_links_imdb() {
        let credits = Credits {
            cast: ["Ford", "Hauer", "Young", "Olmos", "Hannah", "Walsh"]
                .iter()
                .map(|n| CastMember {
                    name: n.to_string(),
                    character: None,
                })
                .collect(),
        };
        let att = movie_attachment(&blade_runner(), &credits, &images());
        assert_eq!(att.title.as_deref(), Some("Blade Runner (1982)"));
        assert_eq!(
            att.title_link.as_deref(),
            Some("http://www.imdb.com/title/tt0083658")
        );
        assert_eq!(
            att.thumb_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w92/poster.jpg")
        );
        let cast = att.fields.iter().find(|f| f.title == "Cast").unwrap();
        assert_eq!(cast.value, "Ford, Hauer, Young, Olmos");
        let rating = att.fields.iter().find(|f| f.title == "TMDB Rating").unwrap();
        assert_eq!(rating.value, "7.9/10 (1234)");
    }

    #[test]
    fn garbled_remote_dates_do_not_panic() {
        // Multibyte char straddling the year prefix; slicing it must not blow up
        // the dispatcher, just drop the year.
        assert_eq!(year_of(Some("12—45")), None);
        assert_eq!(year_of(Some("é")), None);
        assert_eq!(year_of(Some("1982-06-25")).as_deref(), Some("1982"));
        assert_eq!(year_of(Some("198")), None);

        let detail: MovieDetail = serde_json::from_str(
            r#"{"id": 1, "original_title": "Odd Film", "release_date": "12—45"}"#,
        )
        .unwrap();
        let att = movie_attachment(&detail, &Credits { cast: vec![] }, &images());
        assert_eq!(att.title.as_deref(), Some("Odd Film"));
        let released = att.fields.iter().find(|f| f.title == "Released").unwrap();
        assert_eq!(released.value, "Unknown");
    }

    #[test]
    fn movie_attachment_defaults_missing_runtime_and_date() {
        let detail: MovieDetail =
            serde_json::from_str(r#"{"id": 1, "original_title": "Lost Film"}"#).unwrap();
        let att = movie_attachment(&detail, &Credits { cast: vec![] }, &images());
        assert_eq!(att.title.as_deref(), Some("Lost Film"));
        let runtime = att.fields.iter().find(|f| f.title == "Runtime").unwrap();
        assert_eq!(runtime.value, "unknown");
        let released = att.fields.iter().find(|f| f.title == "Released").unwrap();
        assert_eq!(released.value, "Unknown");
    }

    #[test]
    fn person_attachment_lists_known_for() {
        let result = SearchResult {
            id: 4,
            known_for: vec![KnownFor {
                original_title: Some("Blade Runner".to_string()),
                name: None,
                release_date: Some("1982-06-25".to_string()),
                vote_average: Some(7.9),
            }],
            ..Default::default()
        };
        let detail: PersonDetail = serde_json::from_str(
            r#"{
                "id": 4,
                "name": "Harrison Ford",
                "biography": "An actor.",
                "birthday": "1942-07-13",
                "place_of_birth": "Chicago, Illinois, USA",
                "profile_path": "/face.jpg"
            }"#,
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let att = person_attachment(&result, &detail, &images(), today);
        assert_eq!(att.title.as_deref(), Some("Harrison Ford"));
        assert_eq!(
            att.thumb_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w45/face.jpg")
        );
        let known = att.fields.iter().find(|f| f.title == "Known For").unwrap();
        assert_eq!(known.value, "Blade Runner (1982)  _7.9/10_");
        let hometown = att.fields.iter().find(|f| f.title == "Hometown").unwrap();
        assert_eq!(hometown.value, "Chicago, Illinois, USA");
    }

    #[test]
    fn no_results_reply_quotes_the_query() {
        let msg = no_results_reply("blde runnr");
        assert_eq!(
            msg.text.as_deref(),
            Some("No results found for “blde runnr”.")
        );
        assert!(msg.attachments.is_empty());
    }
}
