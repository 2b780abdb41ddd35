use pgrotate::database::quote_literal;
use pgrotate::rotation::password::{is_allowed_char, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use pgrotate::rotation::{is_valid_password, PasswordGenerator};
use proptest::prelude::*;

proptest! {
    #[test]
    fn generated_passwords_follow_policy(
        length in MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH,
        require_each_class in any::<bool>(),
    ) {
        let generator = PasswordGenerator::new(length, require_each_class).unwrap();
        let password = generator.generate();
        let password = password.expose_secret();

        prop_assert_eq!(password.chars().count(), length);
        prop_assert!(password.chars().all(is_allowed_char));
        prop_assert!(is_valid_password(password, require_each_class));
    }

    #[test]
    fn generated_passwords_need_no_escaping(length in MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH) {
        let password = PasswordGenerator::new(length, true).unwrap().generate();
        let password = password.expose_secret();

        prop_assert_eq!(quote_literal(password).unwrap(), format!("'{}'", password));
    }

    #[test]
    fn out_of_range_lengths_are_rejected(length in prop_oneof![0..MIN_PASSWORD_LENGTH, (MAX_PASSWORD_LENGTH + 1)..1024]) {
        prop_assert!(PasswordGenerator::new(length, false).is_err());
    }
}
