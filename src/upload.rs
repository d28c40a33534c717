//! Multipart listing forms and the image pipeline.
//!
//! Text fields are collected raw and only parsed once the handler knows whether
//! it is creating (all required) or updating (all optional) a listing. Images
//! are buffered, then pushed to storage in submission order.

use std::{fmt, str::FromStr};

use axum::extract::Multipart;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{CarCondition, CarUpdate, NewCar},
    storage::StorageState,
};

pub const MAX_IMAGES: usize = 5;
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
/// Object key prefix for every listing image.
pub const IMAGE_FOLDER: &str = "vroomvault_cars";

/// An image file received in the `images` multipart field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub extension: &'static str,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// CarForm
///
/// The raw content of a listing multipart body.
#[derive(Debug, Default)]
pub struct CarForm {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub price: Option<String>,
    pub condition: Option<String>,
    /// `Some("")` when the field was submitted empty, which clears it on update.
    pub description: Option<String>,
    pub images: Vec<ImageUpload>,
}

impl CarForm {
    /// Reads every field of the body. Unknown fields are ignored; empty text
    /// fields and empty file inputs count as absent, except `description`,
    /// which keeps an empty submission.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = CarForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "images" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                if form.images.len() == MAX_IMAGES {
                    return Err(AppError::Validation(format!(
                        "At most {MAX_IMAGES} images can be uploaded at once"
                    )));
                }

                let extension = image_extension(&file_name)?;
                form.images.push(ImageUpload {
                    file_name,
                    extension,
                    content_type: content_type.unwrap_or_else(|| mime_for(extension).to_string()),
                    bytes: bytes.to_vec(),
                });
                continue;
            }

            let slot = match name.as_str() {
                "brand" => &mut form.brand,
                "model" => &mut form.model,
                "year" => &mut form.year,
                "mileage" => &mut form.mileage,
                "price" => &mut form.price,
                "condition" => &mut form.condition,
                "description" => &mut form.description,
                other => {
                    tracing::debug!(field = %other, "Ignoring unknown multipart field");
                    continue;
                }
            };
            let keep_empty = name == "description";
            let value = field.text().await?;
            let value = value.trim();
            *slot = (keep_empty || !value.is_empty()).then(|| value.to_string());
        }

        Ok(form)
    }

    /// Validates the text fields of a new listing. Everything but the description is required.
    pub fn new_car(&self) -> Result<NewCar, AppError> {
        Ok(NewCar {
            brand: required("brand", self.brand.clone())?,
            model: required("model", self.model.clone())?,
            year: required("year", parse_field("year", self.year.as_deref())?)?,
            mileage: required("mileage", parse_field("mileage", self.mileage.as_deref())?)?,
            price: required("price", parse_price(self.price.as_deref())?)?,
            condition: required(
                "condition",
                parse_field::<CarCondition>("condition", self.condition.as_deref())?,
            )?,
            description: self.description.clone().filter(|d| !d.is_empty()),
        })
    }

    /// Validates the text fields of an update. Absent fields keep their stored
    /// value; an empty description clears it.
    pub fn update(&self) -> Result<CarUpdate, AppError> {
        Ok(CarUpdate {
            brand: self.brand.clone(),
            model: self.model.clone(),
            year: parse_field("year", self.year.as_deref())?,
            mileage: parse_field("mileage", self.mileage.as_deref())?,
            price: parse_price(self.price.as_deref())?,
            condition: parse_field("condition", self.condition.as_deref())?,
            description: self
                .description
                .clone()
                .map(|d| (!d.is_empty()).then_some(d)),
            images: Vec::new(),
        })
    }
}

fn required<T>(name: &str, value: Option<T>) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_field<T>(name: &str, raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|e| AppError::Validation(format!("invalid {name} '{value}': {e}")))
    })
    .transpose()
}

fn parse_price(raw: Option<&str>) -> Result<Option<f64>, AppError> {
    match parse_field::<f64>("price", raw)? {
        Some(price) if !price.is_finite() => {
            Err(AppError::Validation("price must be a finite number".to_string()))
        }
        other => Ok(other),
    }
}

/// Lowercased extension of an allowed image file name.
pub fn image_extension(file_name: &str) -> Result<&'static str, AppError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == extension)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "'{file_name}' is not an allowed image (jpg, jpeg, png, gif)"
            ))
        })
}

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

/// store_images
///
/// Uploads images one by one, preserving submission order, and returns their
/// references. When one upload fails, the ones already stored are discarded
/// best-effort before the error is returned.
pub async fn store_images(
    storage: &StorageState,
    images: Vec<ImageUpload>,
) -> Result<Vec<String>, AppError> {
    let mut stored = Vec::with_capacity(images.len());

    for image in images {
        let key = format!("{IMAGE_FOLDER}/{}.{}", Uuid::new_v4(), image.extension);
        match storage
            .upload_image(&key, &image.content_type, image.bytes)
            .await
        {
            Ok(reference) => stored.push(reference),
            Err(e) => {
                tracing::error!(file = %image.file_name, error = %e, "Image upload failed");
                discard_images(storage, &stored).await;
                return Err(e.into());
            }
        }
    }

    Ok(stored)
}

/// discard_images
///
/// Best-effort removal. Failures are logged and never propagated.
pub async fn discard_images(storage: &StorageState, references: &[String]) {
    for reference in references {
        if let Err(e) = storage.delete_image(reference).await {
            tracing::warn!(image = %reference, error = %e, "Failed to remove stored image");
        }
    }
}
