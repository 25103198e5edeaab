//! HTML pages for the browser upload flow

use crate::engine::classifier::Emotion;

const STYLE: &str = r#"
        body {
            font-family: Arial, sans-serif;
            background: #f2f4f8;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
        }
        .box {
            background: white;
            padding: 30px 40px;
            border-radius: 10px;
            box-shadow: 0 4px 12px rgba(0, 0, 0, 0.1);
            text-align: center;
        }
        button {
            margin-top: 15px;
            padding: 10px 20px;
            background: #4a6cf7;
            color: white;
            border: none;
            border-radius: 5px;
            cursor: pointer;
        }
        button:hover {
            background: #3552d6;
        }
"#;

/// Upload form posting field `file` to the web prediction route
pub fn home_page() -> String {
    format!(
        r#"<html>
<head>
    <title>Emotion Detection</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="box">
        <h2>Emotion Detection</h2>
        <form action="/predict-emotion-web" method="post" enctype="multipart/form-data">
            <input type="file" name="file" accept="image/*" required>
            <br>
            <button type="submit">Predict Emotion</button>
        </form>
    </div>
</body>
</html>"#
    )
}

pub fn upload_prompt_page() -> &'static str {
    "<h2 style='text-align:center;'>Upload an image from <a href='/'>home</a></h2>"
}

/// Result page; `confidence_percent` already has one decimal place
pub fn prediction_page(emotion: Emotion, confidence_percent: f32) -> String {
    format!(
        "<h1 style='text-align:center;'>Emotion: {}</h1>\n\
         <h3 style='text-align:center;'>Confidence: {:.1}%</h3>\n\
         <div style='text-align:center;'><a href='/'>Try Another Image</a></div>",
        emotion, confidence_percent
    )
}

pub fn no_face_page() -> &'static str {
    "<h2 style='text-align:center;'>No face detected</h2><a href='/'>Try again</a>"
}

pub fn invalid_image_page() -> &'static str {
    "<h2>Invalid image file</h2>"
}

pub fn missing_file_page() -> &'static str {
    "<h2 style='text-align:center;'>No file uploaded</h2><a href='/'>Try again</a>"
}

pub fn file_too_large_page() -> &'static str {
    "<h2 style='text-align:center;'>File too large</h2><a href='/'>Try a smaller image</a>"
}

pub fn error_page() -> &'static str {
    "<h2 style='text-align:center;'>Prediction failed</h2><a href='/'>Try again</a>"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_page_form() {
        let page = home_page();
        assert!(page.contains(r#"action="/predict-emotion-web""#));
        assert!(page.contains(r#"name="file""#));
        assert!(page.contains("multipart/form-data"));
    }

    #[test]
    fn test_prediction_page() {
        let page = prediction_page(Emotion::Surprise, 87.7);
        assert!(page.contains("Emotion: Surprise"));
        assert!(page.contains("Confidence: 87.7%"));

        let page = prediction_page(Emotion::Sad, 40.0);
        assert!(page.contains("Confidence: 40.0%"));
    }
}
