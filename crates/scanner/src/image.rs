//! 이미지 참조 검증
//!
//! 스캐너 백엔드에 전달되기 전에 이미지명과 태그의 형식을 검증합니다.
//! 이미지 참조는 서브프로세스 인자로 그대로 전달되므로 셸 메타문자와
//! 공백은 허용하지 않습니다.

use imagegate_core::error::ScanError;
use imagegate_core::types::ScanRequest;

/// 이미지명 최대 길이
pub const MAX_IMAGE_NAME_LEN: usize = 255;

/// 태그 최대 길이
pub const MAX_IMAGE_TAG_LEN: usize = 100;

/// 스캔 요청의 이미지명과 태그를 검증합니다.
pub fn validate_image_ref(request: &ScanRequest) -> Result<(), ScanError> {
    validate_image_name(&request.image_name)?;
    validate_image_tag(&request.image_name, &request.image_tag)?;
    Ok(())
}

/// 이미지명을 검증합니다.
///
/// 레지스트리 호스트(`registry.example.com:5000/app`)를 포함할 수 있으므로
/// 소문자 영숫자와 `.`, `-`, `_`, `/`, `:`를 허용합니다.
fn validate_image_name(name: &str) -> Result<(), ScanError> {
    if name.is_empty() {
        return Err(ScanError::InvalidImage {
            image: name.to_owned(),
            reason: "image name must not be empty".to_owned(),
        });
    }
    if name.len() > MAX_IMAGE_NAME_LEN {
        return Err(ScanError::InvalidImage {
            image: name.to_owned(),
            reason: format!("image name exceeds {MAX_IMAGE_NAME_LEN} characters"),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_' | '/' | ':'))
    {
        return Err(ScanError::InvalidImage {
            image: name.to_owned(),
            reason: "image name contains invalid characters".to_owned(),
        });
    }
    Ok(())
}

/// 태그를 검증합니다.
///
/// OCI 태그 규칙을 따릅니다: 영숫자로 시작, 이후 영숫자와 `.`, `-`, `_`.
fn validate_image_tag(image: &str, tag: &str) -> Result<(), ScanError> {
    if tag.is_empty() {
        return Err(ScanError::InvalidImage {
            image: image.to_owned(),
            reason: "image tag must not be empty".to_owned(),
        });
    }
    if tag.len() > MAX_IMAGE_TAG_LEN {
        return Err(ScanError::InvalidImage {
            image: image.to_owned(),
            reason: format!("image tag exceeds {MAX_IMAGE_TAG_LEN} characters"),
        });
    }
    let mut chars = tag.chars();
    let first_valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !first_valid
        || !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ScanError::InvalidImage {
            image: image.to_owned(),
            reason: format!("invalid tag '{tag}'"),
        });
    }
    Ok(())
}
