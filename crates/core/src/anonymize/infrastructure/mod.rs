pub mod anonymizer_factory;
pub mod blur_anonymizer;
pub mod gaussian;
pub mod label;
pub mod mask_anonymizer;
