use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

pub const DEFAULT_IMAGE_TEMPLATE: &str = "%Y-%m-%d-%H%M%S_$wx$h_rscrot.png";
pub const DEFAULT_VIDEO_TEMPLATE: &str = "%Y-%m-%d-%H%M%S_$wx$h_rscrot.webm";
pub const CLIPBOARD_PLACEHOLDER: &str = "[CLIPBOARD]";
const JPEG_QUALITY: u8 = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported image format: {extension}")]
    UnsupportedFormat { extension: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Expands `%` strftime tokens, `$w`/`$h` and a leading `~` in an output template.
pub fn expand_template(template: &str, width: u32, height: u32) -> String {
    expand_template_at(
        template,
        width,
        height,
        &Local::now(),
        dirs::home_dir().as_deref(),
    )
}

pub fn expand_template_at<Tz>(
    template: &str,
    width: u32,
    height: u32,
    now: &DateTime<Tz>,
    home: Option<&Path>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let expanded = format_time(template, now)
        .replace("$w", &width.to_string())
        .replace("$h", &height.to_string());
    expand_home(&expanded, home)
}

/// Template for `--exec`: `$f` becomes the output path before the usual expansion.
pub fn expand_command(command: &str, filename: &str, width: u32, height: u32) -> String {
    expand_template(&command.replace("$f", filename), width, height)
}

fn format_time<Tz>(template: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        tracing::warn!(template, "invalid strftime specifier in template; leaving it verbatim");
        return template.to_string();
    }
    now.format_with_items(items.into_iter()).to_string()
}

fn expand_home(path: &str, home: Option<&Path>) -> String {
    let Some(home) = home else {
        return path.to_string();
    };
    if path == "~" {
        return home.display().to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest).display().to_string(),
        None => path.to_string(),
    }
}

/// Image format derived from the file extension; no extension means PNG.
pub fn image_format_for(path: &Path) -> StorageResult<ImageFormat> {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return Ok(ImageFormat::Png);
    };
    ImageFormat::from_extension(extension)
        .filter(|format| format.writing_enabled())
        .ok_or_else(|| StorageError::UnsupportedFormat {
            extension: extension.to_string(),
        })
}

pub fn save_image(image: &RgbaImage, path: &Path) -> StorageResult<PathBuf> {
    let format = image_format_for(path)?;
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let writer = BufWriter::new(File::create(path)?);
            JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&rgb)?;
        }
        format => image.save_with_format(path, format)?,
    }
    tracing::debug!(path = %path.display(), ?format, "image saved");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 6, 17, 8, 23, 35)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn default_template_expands_date_and_size() {
        let name = expand_template_at(DEFAULT_IMAGE_TEMPLATE, 263, 738, &fixed_time(), None);
        assert_eq!(name, "2013-06-17-082335_263x738_rscrot.png");
    }

    #[test]
    fn template_expands_home_directory() {
        let name = expand_template_at(
            "~/shots/$w-$h.jpg",
            10,
            20,
            &fixed_time(),
            Some(Path::new("/home/me")),
        );
        assert_eq!(name, "/home/me/shots/10-20.jpg");

        let untouched =
            expand_template_at("a~/b.png", 1, 1, &fixed_time(), Some(Path::new("/home/me")));
        assert_eq!(untouched, "a~/b.png");
    }

    #[test]
    fn invalid_strftime_leaves_template_verbatim() {
        let name = expand_template_at("shot_$w_100%", 5, 6, &fixed_time(), None);
        assert_eq!(name, "shot_5_100%");
    }

    #[test]
    fn command_expansion_substitutes_filename_first() {
        let command = expand_command("echo $f $wx$h", CLIPBOARD_PLACEHOLDER, 3, 4);
        assert_eq!(command, "echo [CLIPBOARD] 3x4");
    }

    #[test]
    fn image_format_defaults_to_png() {
        assert_eq!(
            image_format_for(Path::new("/tmp/shot")).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            image_format_for(Path::new("/tmp/shot.JPG")).unwrap(),
            ImageFormat::Jpeg
        );
        assert!(matches!(
            image_format_for(Path::new("/tmp/shot.xyz")),
            Err(StorageError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn save_image_writes_png_and_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));

        let png = save_image(&image, &dir.path().join("shot.png"))
            .expect("png save");
        let decoded = image::open(&png).expect("png decode");
        assert_eq!((decoded.width(), decoded.height()), (4, 3));

        let jpeg = save_image(&image, &dir.path().join("shot.jpg"))
            .expect("jpeg save");
        assert!(std::fs::metadata(jpeg).expect("jpeg metadata").len() > 0);

        let bare = save_image(&image, &dir.path().join("bare"))
            .expect("bare save");
        let bytes = std::fs::read(bare).expect("read bare");
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn save_image_reports_missing_directory() {
        let image = RgbaImage::new(1, 1);
        let err = save_image(&image, Path::new("/nonexistent-dir-rscrot/shot.jpg"))
            .expect_err("missing directory must fail");
        assert!(matches!(err, StorageError::Io(_)));
    }
}
