pub mod execution_provider;
pub mod onnx_face_detector;
pub mod onnx_face_embedder;
