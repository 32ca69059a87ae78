//! HTML rendering for the single demo page.

use std::fmt::Write as _;

use crate::classifier::PredictionResult;
use crate::content::ContentEntry;
use crate::video::thumbnail_url;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 1100px; margin: 0 auto; padding: 16px; color: #263238; }
h1 { color: #1E88E5; text-align: center; font-weight: 800; letter-spacing: -0.5px; }
.columns { display: grid; grid-template-columns: 1fr 1fr; gap: 24px; align-items: start; }
.inputs { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; margin-bottom: 16px; }
.input-card { border: 2px dashed #1E88E5; border-radius: 12px; padding: 16px; background: #f5fafe; }
.input-card h3 { margin: 0 0 8px; }
.prediction-box { background: #E3F2FD; border: 2px solid #1E88E5; border-radius: 12px; padding: 22px; text-align: center; margin: 16px 0; box-shadow: 0 4px 10px rgba(0,0,0,.06); }
.prediction-box h2 { color: #0D47A1; margin: 0; font-size: 2.0rem; }
.prob-card { background: #fff; border-radius: 10px; padding: 12px 14px; margin: 10px 0; box-shadow: 0 2px 6px rgba(0,0,0,.06); }
.prob-head { display: flex; justify-content: space-between; margin-bottom: 6px; }
.prob-bar-bg { background: #ECEFF1; border-radius: 6px; width: 100%; height: 22px; overflow: hidden; }
.prob-bar-fg { background: #4CAF50; height: 100%; border-radius: 6px; }
.prob-bar-fg.highlight { background: #FF6F00; }
.info-grid { display: grid; grid-template-columns: repeat(12, 1fr); gap: 14px; margin-bottom: 14px; }
.card { border: 1px solid #e3e6ea; border-radius: 12px; padding: 14px; background: #fff; box-shadow: 0 2px 6px rgba(0,0,0,.05); }
.card h4 { margin: 0 0 10px; font-size: 1.05rem; color: #0D47A1; }
.thumb { width: 100%; height: auto; border-radius: 10px; display: block; }
.thumb-wrap { position: relative; display: block; }
.play { position: absolute; top: 50%; left: 50%; transform: translate(-50%,-50%); width: 60px; height: 60px; border-radius: 50%; background: rgba(0,0,0,.55); }
.play:after { content: ''; border-style: solid; border-width: 12px 0 12px 20px; border-color: transparent transparent transparent #fff; position: absolute; top: 50%; left: 50%; transform: translate(-40%,-50%); }
.helper { color: #607D8B; font-size: .9rem; word-break: break-all; }
.notice { background: #E8F4FD; border-left: 4px solid #1E88E5; padding: 12px 16px; border-radius: 6px; margin: 12px 0; }
.error { background: #FDECEA; border-left: 4px solid #D32F2F; padding: 12px 16px; border-radius: 6px; margin: 12px 0; }
.input-image { width: 100%; border-radius: 12px; }
"#;

/// Everything shown below the inputs once an image has been classified.
pub struct ResultView<'a> {
    pub image_data_uri: Option<&'a str>,
    pub prediction: &'a PredictionResult,
    pub labels: &'a [String],
    pub panel_label: &'a str,
    pub content: ContentEntry,
}

/// The whole page.
#[derive(Default)]
pub struct PageView<'a> {
    pub error: Option<String>,
    /// Known vocabulary, shown when the model is already loaded
    pub labels: Option<&'a [String]>,
    pub result: Option<ResultView<'a>>,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn page(view: &PageView<'_>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>Image classifier</title><style>{}</style></head><body>",
        STYLE
    );
    html.push_str("<h1>Image classifier: probabilities and label content</h1>");

    if let Some(labels) = view.labels {
        let joined = labels.iter().map(|l| escape_html(l)).collect::<Vec<_>>().join(", ");
        let _ = write!(html, "<p><strong>Known labels:</strong> <code>{}</code></p>", joined);
    }

    html.push_str(&inputs());

    if let Some(error) = &view.error {
        let _ = write!(html, "<div class=\"error\" role=\"alert\">{}</div>", escape_html(error));
    }

    match &view.result {
        Some(result) => html.push_str(&result_section(result)),
        None => html.push_str(
            "<div class=\"notice\">Take a photo or upload an image to see the prediction \
             and the content for its label.</div>",
        ),
    }

    html.push_str(
        "<form method=\"post\" action=\"/reset\"><button type=\"submit\">Start over</button></form>",
    );
    html.push_str("</body></html>");
    html
}

fn inputs() -> String {
    String::from(
        "<div class=\"inputs\">\
         <form class=\"input-card\" method=\"post\" action=\"/predict\" enctype=\"multipart/form-data\">\
         <h3>Camera</h3>\
         <input type=\"file\" name=\"camera\" accept=\"image/*\" capture=\"environment\" required>\
         <button type=\"submit\">Classify snapshot</button></form>\
         <form class=\"input-card\" method=\"post\" action=\"/predict\" enctype=\"multipart/form-data\">\
         <h3>Upload</h3>\
         <input type=\"file\" name=\"upload\" accept=\".jpg,.jpeg,.png,.webp,.tif,.tiff,image/*\" required>\
         <button type=\"submit\">Classify file</button></form>\
         </div>",
    )
}

fn result_section(view: &ResultView<'_>) -> String {
    let mut html = String::new();
    let predicted = escape_html(&view.prediction.predicted_label);

    html.push_str("<div class=\"columns\"><div>");
    if let Some(uri) = view.image_data_uri {
        let _ = write!(
            html,
            "<figure><img class=\"input-image\" src=\"{}\" alt=\"Input image\"><figcaption>Input image</figcaption></figure>",
            escape_html(uri)
        );
    }
    let _ = write!(
        html,
        "</div><div><div class=\"prediction-box\"><span style=\"font-size:1.0rem;color:#555;\">Prediction:</span>\
         <h2>{}</h2><div class=\"helper\">The panel below shows the content for the predicted label.</div></div></div></div>",
        predicted
    );

    html.push_str("<div class=\"columns\"><section><h3>Class probabilities</h3>");
    html.push_str(&probability_bars(view.prediction));
    html.push_str("</section><section><h3>Content by label</h3>");
    html.push_str(&label_selector(view.labels, view.panel_label));
    html.push_str(&content_panel(&view.content));
    html.push_str("</section></div>");
    html
}

/// One card per label, in ranked order. Bar width is the probability as a percentage.
pub fn probability_bars(prediction: &PredictionResult) -> String {
    let mut html = String::new();
    for score in &prediction.ranked {
        let pct = score.percent();
        let highlight = if prediction.is_predicted(&score.label) { " highlight" } else { "" };
        let _ = write!(
            html,
            "<div class=\"prob-card\"><div class=\"prob-head\"><strong>{}</strong><span>{:.2}%</span></div>\
             <div class=\"prob-bar-bg\"><div class=\"prob-bar-fg{}\" style=\"width:{:.4}%;\"></div></div></div>",
            escape_html(&score.label),
            pct,
            highlight,
            pct
        );
    }
    html
}

pub fn label_selector(labels: &[String], selected: &str) -> String {
    let mut html = String::from(
        "<form method=\"get\" action=\"/\"><label for=\"label\">Label to show</label> \
         <select id=\"label\" name=\"label\" onchange=\"this.form.submit()\">",
    );
    for label in labels {
        let escaped = escape_html(label);
        let marker = if label == selected { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{}\"{}>{}</option>", escaped, marker, escaped);
    }
    html.push_str("</select> <noscript><button type=\"submit\">Show</button></noscript></form>");
    html
}

pub fn content_panel(entry: &ContentEntry) -> String {
    if entry.is_empty() {
        return format!(
            "<div class=\"notice\">There is no content for label <code>{}</code> yet.</div>",
            escape_html(&entry.label)
        );
    }

    let mut html = String::new();

    if !entry.texts.is_empty() {
        html.push_str("<div class=\"info-grid\">");
        for text in &entry.texts {
            let _ = write!(
                html,
                "<div class=\"card\" style=\"grid-column:span 12;\"><h4>Text</h4><div>{}</div></div>",
                escape_html(text)
            );
        }
        html.push_str("</div>");
    }

    if !entry.images.is_empty() {
        html.push_str("<div class=\"info-grid\">");
        for uri in &entry.images {
            let _ = write!(
                html,
                "<div class=\"card\" style=\"grid-column:span 4;\"><h4>Image</h4><img src=\"{}\" class=\"thumb\" alt=\"\"></div>",
                escape_html(uri)
            );
        }
        html.push_str("</div>");
    }

    if !entry.videos.is_empty() {
        html.push_str("<div class=\"info-grid\">");
        for url in &entry.videos {
            html.push_str(&video_card(url));
        }
        html.push_str("</div>");
    }

    html
}

/// A thumbnail card when the URL carries a video id, a plain link otherwise.
pub fn video_card(url: &str) -> String {
    let href = escape_html(url);
    match thumbnail_url(url) {
        Some(thumb) => format!(
            "<div class=\"card\" style=\"grid-column:span 6;\"><h4>Video</h4>\
             <a href=\"{href}\" target=\"_blank\" rel=\"noopener\" class=\"thumb-wrap\">\
             <img src=\"{thumb}\" class=\"thumb\" alt=\"Video thumbnail\"><div class=\"play\"></div></a>\
             <div class=\"helper\">{href}</div></div>",
            href = href,
            thumb = escape_html(&thumb)
        ),
        None => format!(
            "<div class=\"card\" style=\"grid-column:span 6;\"><h4>Video</h4>\
             <a href=\"{href}\" target=\"_blank\" rel=\"noopener\">{href}</a></div>",
            href = href
        ),
    }
}
