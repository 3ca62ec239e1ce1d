use crate::config::AssetsConfig;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use tumour_prediction::Prediction;

/// Static pieces of the upload page, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct PageAssets {
    hero_background: String,
}

impl PageAssets {
    pub fn load(config: &AssetsConfig) -> Self {
        let hero_background = match embed_image(&config.hero_image) {
            Some(data_url) => format!("url('{}')", data_url),
            None => {
                tracing::info!(
                    "Hero image {:?} not found, using {}",
                    config.hero_image,
                    config.hero_fallback_url
                );
                format!("url('{}')", config.hero_fallback_url)
            }
        };

        Self { hero_background }
    }

    pub fn hero_background(&self) -> &str {
        &self.hero_background
    }
}

fn embed_image(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mime = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    };
    Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(assets: &PageAssets, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Brain Tumour Prediction</title>
<style>
body {{ font-family: sans-serif; margin: 0; background: #f4f2fb; }}
.hero {{ background-image: {hero}; background-size: cover; color: #fff; padding: 48px; }}
.panel {{ max-width: 640px; margin: 32px auto; background: #fff; padding: 24px; border-radius: 12px; }}
.error {{ color: #b3261e; }}
</style>
</head>
<body>
<div class="hero"><h1>Brain Tumour<br>Prediction system</h1></div>
<div class="panel">{body}</div>
</body>
</html>"#,
        hero = assets.hero_background(),
        body = body
    )
}

const UPLOAD_FORM: &str = r#"<form action="/analyze" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept="image/png,image/jpeg">
<button type="submit">Analyze</button>
</form>"#;

pub fn render_index(assets: &PageAssets) -> String {
    layout(
        assets,
        &format!("<h2>Upload an MRI scan</h2>{}", UPLOAD_FORM),
    )
}

pub fn render_prediction(assets: &PageAssets, prediction: &Prediction) -> String {
    layout(
        assets,
        &format!(
            "<h2>Result</h2><p>Prediction: <strong>{}</strong></p><p>Confidence: {:.2}%</p>{}",
            escape(prediction.label.as_str()),
            prediction.confidence * 100.0,
            UPLOAD_FORM
        ),
    )
}

pub fn render_error(assets: &PageAssets, message: &str) -> String {
    layout(
        assets,
        &format!(
            "<h2>Result</h2><p class=\"error\">{}</p>{}",
            escape(message),
            UPLOAD_FORM
        ),
    )
}
