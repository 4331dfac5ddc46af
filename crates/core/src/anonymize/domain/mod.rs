pub mod face_anonymizer;
