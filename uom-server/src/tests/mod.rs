mod test_utils;
mod api_tests;
