pub mod key_name_to_vk_code;

pub use key_name_to_vk_code::KeyNameToVkCode;
